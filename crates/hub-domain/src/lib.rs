#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod channel;
pub mod descriptor;
pub mod error;
pub mod node;

pub use channel::PluginChannel;
pub use descriptor::{stable_version, PluginDescriptor, DESCRIPTOR_FILE_NAME, SNAPSHOT_VERSION};
pub use error::DeployError;
pub use node::{Extension, PluginNode};
