use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use dirs_next::home_dir;

/// Environment override for the hub home directory.
pub const HUB_HOME_ENV: &str = "HUB_HOME";

/// Directory under `$HOME` used when no override is set.
pub const DEFAULT_HOME_DIR: &str = ".hub";

#[derive(Debug, Clone)]
pub struct HubLocation {
    pub path: PathBuf,
    pub source: &'static str,
}

/// Determine the hub home directory.
///
/// # Errors
///
/// Returns an error if neither an override nor a home directory can be
/// resolved.
pub fn resolve_hub_home() -> Result<HubLocation> {
    if let Some(override_path) = env::var_os(HUB_HOME_ENV) {
        let path = absolutize(PathBuf::from(override_path))?;
        return Ok(HubLocation {
            path,
            source: HUB_HOME_ENV,
        });
    }

    let home = home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    Ok(HubLocation {
        path: home.join(DEFAULT_HOME_DIR),
        source: "HOME/.hub",
    })
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let current = env::current_dir().context("unable to determine current directory")?;
    Ok(current.join(path))
}
