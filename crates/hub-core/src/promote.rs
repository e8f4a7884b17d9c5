use std::fs;
use std::path::Path;

use hub_domain::{DeployError, PluginChannel, PluginNode};
use serde::Serialize;

use crate::hub::Hub;

/// Counts from one promotion run.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct PromoteSummary {
    pub examined: usize,
    pub promoted: usize,
    pub skipped: usize,
}

/// Copies every artifact `dest` is missing from `source`.
///
/// A node is missing when `dest` has no entry with the same id, platform
/// version, and version, so re-running a promotion moves nothing new.
/// Promotion stops at the first storage failure.
pub fn promote(
    hub: &Hub,
    source: PluginChannel,
    dest: PluginChannel,
) -> Result<PromoteSummary, DeployError> {
    let mut summary = PromoteSummary::default();
    if source == dest {
        return Ok(summary);
    }

    let from = hub.repository(source);
    let to = hub.repository(dest);

    for node in from.nodes() {
        summary.examined += 1;

        let existing = to.select(&node.platform_version, &node.id, true);
        if existing.is_some_and(|current| current.identity() == node.identity()) {
            summary.skipped += 1;
            continue;
        }

        let Some(source_file) = node.target_file.clone() else {
            tracing::warn!(
                "{} {} on {} has no stored artifact, skipping",
                node.id,
                node.version,
                source
            );
            summary.skipped += 1;
            continue;
        };

        let extension = artifact_extension(&node, &source_file);
        let mut copy = node.clone();
        copy.target_file = None;
        copy.sha256 = None;
        to.push(&mut copy, &extension, |dest_path| {
            fs::copy(&source_file, dest_path)?;
            Ok(())
        })?;
        summary.promoted += 1;
    }

    tracing::debug!(
        "promoted {} of {} nodes from {} to {} ({} already present)",
        summary.promoted,
        summary.examined,
        source,
        dest,
        summary.skipped
    );
    Ok(summary)
}

/// Recovers the artifact extension from its stored file name, so multi-part
/// extensions like `tar.gz` survive promotion.
fn artifact_extension(node: &PluginNode, stored: &Path) -> String {
    let prefix = format!("{}_{}.", node.id, node.version);
    if let Some(file_name) = stored.file_name().and_then(|name| name.to_str()) {
        if let Some(extension) = file_name.strip_prefix(&prefix) {
            if !extension.is_empty() {
                return extension.to_string();
            }
        }
    }
    stored.extension().map_or_else(
        || "bin".to_owned(),
        |ext| ext.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use hub_domain::PluginNode;

    use super::artifact_extension;

    #[test]
    fn multi_part_extensions_are_recovered_whole() {
        let node = PluginNode::new("org.consulo", "1554", "1554");
        let stored = Path::new("/hub/plugin/nightly/org.consulo_1554.tar.gz");
        assert_eq!(artifact_extension(&node, stored), "tar.gz");
    }

    #[test]
    fn unrecognized_names_fall_back_to_the_path_extension() {
        let node = PluginNode::new("org.example", "1.0", "1554");
        let stored = Path::new("/hub/plugin/nightly/renamed-artifact.zip");
        assert_eq!(artifact_extension(&node, stored), "zip");
    }
}
