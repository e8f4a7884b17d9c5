use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use anyhow::Context;
use hub_domain::{DeployError, Extension, PluginChannel, PluginNode};
use walkdir::WalkDir;

use crate::analyzer::ExtensionAnalyzer;
use crate::extract::{locate_plugin, unpack_archive};
use crate::hub::Hub;
use crate::scratch::ScratchGuard;

/// Name recorded on platform nodes, which carry no descriptor.
pub const PLATFORM_NODE_NAME: &str = "Platform";
pub const PLATFORM_ARCHIVE_EXTENSION: &str = "tar.gz";
pub const PLUGIN_ARCHIVE_EXTENSION: &str = "zip";

/// Runs the deploy pipeline against a hub.
pub struct DeployService<'a> {
    hub: &'a Hub,
    analyzer: &'a dyn ExtensionAnalyzer,
}

impl<'a> DeployService<'a> {
    pub fn new(hub: &'a Hub, analyzer: &'a dyn ExtensionAnalyzer) -> Self {
        DeployService { hub, analyzer }
    }

    /// Stores a platform archive verbatim under `declared_id`.
    ///
    /// Platform builds have no descriptor; identity comes from the caller and
    /// the platform version doubles as the node version.
    pub fn deploy_platform(
        &self,
        channel: PluginChannel,
        platform_version: u32,
        declared_id: &str,
        archive: &mut dyn Read,
    ) -> Result<PluginNode, DeployError> {
        let scratch = self.hub.scratch();
        let mut guard = ScratchGuard::new(scratch);

        let upload = guard.track(scratch.create_path("deploy", PLATFORM_ARCHIVE_EXTENSION)?);
        {
            let mut out = File::create(&upload)?;
            io::copy(archive, &mut out)?;
        }

        let version = platform_version.to_string();
        let mut node = PluginNode::new(declared_id, version.clone(), version);
        node.name = Some(PLATFORM_NODE_NAME.to_owned());

        self.hub
            .repository(channel)
            .push(&mut node, PLATFORM_ARCHIVE_EXTENSION, |dest| {
                fs::copy(&upload, dest)?;
                Ok(())
            })?;

        tracing::debug!(
            "deployed platform {} {} to {}",
            node.id,
            node.version,
            channel
        );
        Ok(node)
    }

    /// Validates, repackages, and stores a plugin archive.
    ///
    /// The upload lands in scratch before any inspection, so a rejected
    /// deploy leaves the channel untouched. The stored artifact is a fresh
    /// zip whose entries all live under the plugin id.
    pub fn deploy_plugin<R: Read>(
        &self,
        channel: PluginChannel,
        open_archive: impl FnOnce() -> io::Result<R>,
    ) -> Result<PluginNode, DeployError> {
        let scratch = self.hub.scratch();
        let mut guard = ScratchGuard::new(scratch);

        let upload = guard.track(scratch.create_path("deploy", PLUGIN_ARCHIVE_EXTENSION)?);
        {
            let mut archive = open_archive()?;
            let mut out = File::create(&upload)?;
            io::copy(&mut archive, &mut out)?;
        }

        let expanded = guard.track(scratch.create_path("deploy_unzip", "")?);
        unpack_archive(&upload, &expanded)?;

        let located = locate_plugin(&expanded)?;
        let descriptor = located.descriptor;
        descriptor.validate_versions()?;

        let dependencies = descriptor.required_dependencies();
        let mut node = PluginNode::new(
            descriptor.id.clone(),
            descriptor.version.clone(),
            descriptor.platform_version.clone(),
        );
        node.name = descriptor.name.clone();
        node.category = descriptor.category.clone();
        node.description = descriptor.description.clone();
        node.vendor = descriptor.vendor.clone();
        node.dependencies = dependencies.clone();
        node.optional_dependencies = descriptor.optional_dependencies();

        let repository = self.hub.repository(channel);
        match self.analyzer.analyze(&descriptor, repository, &dependencies) {
            Ok(extensions) => {
                node.extensions = extensions
                    .into_iter()
                    .map(|(key, values)| Extension { key, values })
                    .collect();
            }
            Err(err) => {
                tracing::warn!("extension analysis for {} failed: {err:#}", node.id);
            }
        }

        let plugin_root = located.root;
        let plugin_id = node.id.clone();
        repository.push(&mut node, PLUGIN_ARCHIVE_EXTENSION, move |dest| {
            write_canonical_archive(&plugin_root, &plugin_id, dest)
        })?;

        tracing::debug!("deployed plugin {} {} to {}", node.id, node.version, channel);
        Ok(node)
    }
}

/// Repackages the plugin tree as a zip whose entries all sit under the plugin
/// id, whatever layout the upload used. Directory entries are not written.
fn write_canonical_archive(root: &Path, id: &str, dest: &Path) -> anyhow::Result<()> {
    let out =
        File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let mut zip = zip::ZipWriter::new(out);
    let options = zip::write::FileOptions::default();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root)?;
        zip.start_file(zip_entry_name(id, relative), options)?;
        let mut file = File::open(entry.path())?;
        io::copy(&mut file, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}

fn zip_entry_name(id: &str, relative: &Path) -> String {
    let mut name = String::from(id);
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}
