use std::fmt;

/// Release channels a node can be published on, least to most stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginChannel {
    Nightly,
    Alpha,
    Beta,
    Stable,
}

impl PluginChannel {
    pub const ALL: [PluginChannel; 4] = [
        PluginChannel::Nightly,
        PluginChannel::Alpha,
        PluginChannel::Beta,
        PluginChannel::Stable,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "nightly" => Some(PluginChannel::Nightly),
            "alpha" => Some(PluginChannel::Alpha),
            "beta" => Some(PluginChannel::Beta),
            "stable" => Some(PluginChannel::Stable),
            _ => None,
        }
    }

    /// Directory name of this channel under the hub plugin root.
    pub fn dir_name(self) -> &'static str {
        match self {
            PluginChannel::Nightly => "nightly",
            PluginChannel::Alpha => "alpha",
            PluginChannel::Beta => "beta",
            PluginChannel::Stable => "stable",
        }
    }
}

impl fmt::Display for PluginChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
