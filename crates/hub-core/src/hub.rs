use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hub_domain::PluginChannel;

use crate::repository::ChannelRepository;
use crate::scratch::{AsyncDeleter, ScratchSpace};

pub const SCRATCH_DIR_NAME: &str = "scratch";
pub const PLUGIN_DIR_NAME: &str = "plugin";

/// An open hub home: scratch space plus one repository per channel.
pub struct Hub {
    home: PathBuf,
    scratch: ScratchSpace,
    repositories: BTreeMap<PluginChannel, ChannelRepository>,
}

impl Hub {
    /// Opens the hub at `home`, creating the directory layout as needed.
    /// Scratch contents from previous runs are discarded.
    pub fn open(home: &Path) -> Result<Self> {
        Self::open_with_deleter(home, AsyncDeleter::detached())
    }

    pub fn open_with_deleter(home: &Path, deleter: AsyncDeleter) -> Result<Self> {
        fs::create_dir_all(home)
            .with_context(|| format!("failed to create hub home {}", home.display()))?;
        let scratch = ScratchSpace::init(home.join(SCRATCH_DIR_NAME), deleter)?;

        let plugin_root = home.join(PLUGIN_DIR_NAME);
        fs::create_dir_all(&plugin_root)
            .with_context(|| format!("failed to create plugin root {}", plugin_root.display()))?;
        let mut repositories = BTreeMap::new();
        for channel in PluginChannel::ALL {
            repositories.insert(channel, ChannelRepository::open(channel, &plugin_root)?);
        }

        Ok(Hub {
            home: home.to_path_buf(),
            scratch,
            repositories,
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Every channel is opened with the hub, so lookup cannot miss.
    pub fn repository(&self, channel: PluginChannel) -> &ChannelRepository {
        &self.repositories[&channel]
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use hub_domain::PluginChannel;

    use super::{Hub, PLUGIN_DIR_NAME, SCRATCH_DIR_NAME};

    #[test]
    fn open_creates_the_full_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hub = Hub::open(dir.path()).expect("hub opens");

        assert!(dir.path().join(SCRATCH_DIR_NAME).is_dir());
        for channel in PluginChannel::ALL {
            let channel_dir = dir.path().join(PLUGIN_DIR_NAME).join(channel.dir_name());
            assert!(channel_dir.is_dir(), "missing {channel} directory");
            assert_eq!(hub.repository(channel).channel(), channel);
        }
    }

    #[test]
    fn open_discards_previous_scratch_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = dir.path().join(SCRATCH_DIR_NAME).join("deploy_1.zip");
        fs::create_dir_all(stale.parent().expect("parent")).expect("seed scratch");
        fs::write(&stale, b"stale").expect("seed file");

        let hub = Hub::open(dir.path()).expect("hub opens");
        assert!(!stale.exists(), "old scratch must be wiped");
        assert!(hub.scratch().root().is_dir());
    }
}
