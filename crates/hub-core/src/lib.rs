#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod analyzer;
pub mod config;
pub mod deploy;
pub mod extract;
pub mod hub;
pub mod outcome;
pub mod promote;
pub mod repository;
pub mod scratch;

pub use analyzer::{DeclaredExtensions, ExtensionAnalyzer};
pub use config::{resolve_hub_home, HubLocation, DEFAULT_HOME_DIR, HUB_HOME_ENV};
pub use deploy::{
    DeployService, PLATFORM_ARCHIVE_EXTENSION, PLATFORM_NODE_NAME, PLUGIN_ARCHIVE_EXTENSION,
};
pub use extract::{locate_plugin, unpack_archive, LocatedPlugin};
pub use hub::{Hub, PLUGIN_DIR_NAME, SCRATCH_DIR_NAME};
pub use outcome::{
    deploy_error_outcome, format_status_message, to_json_response, CommandStatus, ExecutionOutcome,
};
pub use promote::{promote, PromoteSummary};
pub use repository::{ChannelRepository, INDEX_FILE_NAME};
pub use scratch::{AsyncDeleter, ScratchGuard, ScratchSpace};
