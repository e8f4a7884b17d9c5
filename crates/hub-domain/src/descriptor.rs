use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Context, Result};
use toml_edit::{DocumentMut, Item};

use crate::error::DeployError;

/// File every plugin archive must carry exactly once.
pub const DESCRIPTOR_FILE_NAME: &str = "plugin.toml";

/// Marker version for builds that are not publishable.
pub const SNAPSHOT_VERSION: &str = "SNAPSHOT";

/// Parsed `plugin.toml` contents, before any deploy policy is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub id: String,
    pub version: String,
    pub platform_version: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub depends: Vec<String>,
    pub optional_depends: Vec<String>,
    pub extensions: BTreeMap<String, BTreeSet<String>>,
}

impl PluginDescriptor {
    /// Parses descriptor TOML. Version fields may be absent here; deploy
    /// policy rejects them later through [`stable_version`].
    pub fn parse(contents: &str) -> Result<Self> {
        let doc: DocumentMut = contents
            .parse()
            .context("descriptor is not well-formed TOML")?;

        Ok(PluginDescriptor {
            id: required_string(&doc, "id")?,
            version: string_or_default(&doc, "version")?,
            platform_version: string_or_default(&doc, "platform-version")?,
            name: optional_string(&doc, "name")?,
            category: optional_string(&doc, "category")?,
            description: optional_string(&doc, "description")?,
            vendor: optional_string(&doc, "vendor")?,
            depends: string_array(&doc, "depends")?,
            optional_depends: string_array(&doc, "optional-depends")?,
            extensions: extensions_table(&doc)?,
        })
    }

    /// Applies the publication policy to both version fields.
    pub fn validate_versions(&self) -> Result<(), DeployError> {
        stable_version(&self.version)?;
        stable_version(&self.platform_version)?;
        Ok(())
    }

    /// Hard dependencies: everything in `depends` not also declared optional.
    pub fn required_dependencies(&self) -> BTreeSet<String> {
        let optional: BTreeSet<&str> = self.optional_depends.iter().map(String::as_str).collect();
        self.depends
            .iter()
            .filter(|id| !optional.contains(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn optional_dependencies(&self) -> BTreeSet<String> {
        self.optional_depends.iter().cloned().collect()
    }
}

/// Accepts a version for publication. Empty and snapshot values never ship.
pub fn stable_version(value: &str) -> Result<&str, DeployError> {
    if value.is_empty() || value == SNAPSHOT_VERSION {
        return Err(DeployError::InvalidVersion {
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn required_string(doc: &DocumentMut, key: &str) -> Result<String> {
    let value = doc
        .get(key)
        .and_then(Item::as_str)
        .ok_or_else(|| anyhow!("`{key}` must be a string"))?;
    if value.trim().is_empty() {
        return Err(anyhow!("`{key}` must not be empty"));
    }
    Ok(value.to_string())
}

fn string_or_default(doc: &DocumentMut, key: &str) -> Result<String> {
    match doc.get(key) {
        None => Ok(String::new()),
        Some(item) => item
            .as_str()
            .map(std::string::ToString::to_string)
            .ok_or_else(|| anyhow!("`{key}` must be a string")),
    }
}

fn optional_string(doc: &DocumentMut, key: &str) -> Result<Option<String>> {
    match doc.get(key) {
        None => Ok(None),
        Some(item) => item
            .as_str()
            .map(|value| Some(value.to_string()))
            .ok_or_else(|| anyhow!("`{key}` must be a string")),
    }
}

fn string_array(doc: &DocumentMut, key: &str) -> Result<Vec<String>> {
    match doc.get(key) {
        None => Ok(Vec::new()),
        Some(item) => item
            .as_array()
            .map(|array| {
                array
                    .iter()
                    .filter_map(|value| value.as_str())
                    .map(std::string::ToString::to_string)
                    .collect()
            })
            .ok_or_else(|| anyhow!("`{key}` must be an array of strings")),
    }
}

fn extensions_table(doc: &DocumentMut) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let Some(item) = doc.get("extensions") else {
        return Ok(BTreeMap::new());
    };
    let table = item
        .as_table()
        .ok_or_else(|| anyhow!("`extensions` must be a table of string arrays"))?;
    let mut extensions = BTreeMap::new();
    for (key, value) in table.iter() {
        let values = value
            .as_array()
            .map(|array| {
                array
                    .iter()
                    .filter_map(|entry| entry.as_str())
                    .map(std::string::ToString::to_string)
                    .collect::<BTreeSet<_>>()
            })
            .ok_or_else(|| anyhow!("`extensions.{key}` must be an array of strings"))?;
        extensions.insert(key.to_string(), values);
    }
    Ok(extensions)
}
