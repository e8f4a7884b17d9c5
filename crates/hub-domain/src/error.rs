use std::path::PathBuf;

use thiserror::Error;

/// Failures the deploy pipeline reports to callers.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Empty and snapshot versions never publish.
    #[error("unstable version {value:?} cannot be deployed")]
    InvalidVersion { value: String },

    /// The archive did not contain exactly one plugin descriptor.
    #[error("archive contains {descriptors} plugin descriptors, expected exactly one")]
    BadArchive { descriptors: usize },

    /// A descriptor was found but could not be read as one.
    #[error("malformed plugin descriptor at {}", path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The uploaded archive could not be expanded.
    #[error("cannot unpack archive")]
    Unpack(#[source] anyhow::Error),

    /// The channel repository failed to store an artifact or its index entry.
    #[error("cannot store artifact {key}")]
    StorageWrite {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
