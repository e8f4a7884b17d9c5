use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One extension point a plugin contributes to, with the values it declares.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub key: String,
    pub values: BTreeSet<String>,
}

/// Stored record of one deployed artifact on one channel.
///
/// Nodes are keyed by `(id, platform_version)` inside a channel index; the
/// full identity additionally includes `version` when channels are compared
/// during promotion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginNode {
    pub id: String,
    pub version: String,
    pub platform_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub optional_dependencies: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<Extension>,
    #[serde(default = "approved_default")]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

// Records written before approval gating existed carry no flag; they were
// publicly visible, so absence reads as approved.
fn approved_default() -> bool {
    true
}

impl PluginNode {
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        platform_version: impl Into<String>,
    ) -> Self {
        PluginNode {
            id: id.into(),
            version: version.into(),
            platform_version: platform_version.into(),
            name: None,
            category: None,
            description: None,
            vendor: None,
            date: OffsetDateTime::now_utc(),
            dependencies: BTreeSet::new(),
            optional_dependencies: BTreeSet::new(),
            extensions: Vec::new(),
            approved: true,
            target_file: None,
            sha256: None,
        }
    }

    /// Key the channel index is organized by.
    pub fn index_key(&self) -> (String, String) {
        (self.id.clone(), self.platform_version.clone())
    }

    /// Identity compared across channels: same id, platform line, and version.
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.id, &self.platform_version, &self.version)
    }

    /// File name the stored artifact uses inside a channel directory.
    pub fn artifact_file_name(&self, extension: &str) -> String {
        format!("{}_{}.{}", self.id, self.version, extension)
    }
}
