use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use hub_domain::PluginDescriptor;

use crate::repository::ChannelRepository;

/// Derives the extension map recorded on a deployed node.
///
/// Analysis is advisory. When it fails the deploy continues with no
/// extensions recorded; see [`crate::deploy::DeployService::deploy_plugin`].
pub trait ExtensionAnalyzer {
    fn analyze(
        &self,
        descriptor: &PluginDescriptor,
        repository: &ChannelRepository,
        dependencies: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, BTreeSet<String>>>;
}

/// Default analyzer: records exactly what the descriptor declares.
pub struct DeclaredExtensions;

impl ExtensionAnalyzer for DeclaredExtensions {
    fn analyze(
        &self,
        descriptor: &PluginDescriptor,
        _repository: &ChannelRepository,
        _dependencies: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        Ok(descriptor.extensions.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use hub_domain::{PluginChannel, PluginDescriptor};

    use super::{DeclaredExtensions, ExtensionAnalyzer};
    use crate::repository::ChannelRepository;

    #[test]
    fn declared_extensions_echo_the_descriptor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = ChannelRepository::open(PluginChannel::Nightly, dir.path()).expect("opens");
        let descriptor = PluginDescriptor::parse(
            "id = \"org.example\"\n[extensions]\n\"com.intellij.fileType\" = [\"xml\"]\n",
        )
        .expect("descriptor parses");

        let extensions = DeclaredExtensions
            .analyze(&descriptor, &repo, &BTreeSet::new())
            .expect("analysis succeeds");
        assert_eq!(extensions, descriptor.extensions);
    }
}
