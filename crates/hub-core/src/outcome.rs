use hub_domain::DeployError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

#[must_use]
pub fn to_json_response(command: &str, outcome: &ExecutionOutcome) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user-error",
        CommandStatus::Failure => "error",
    };
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": status,
        "message": format_status_message(command, &outcome.message),
        "details": details,
    })
}

#[must_use]
pub fn format_status_message(command: &str, message: &str) -> String {
    let prefix = format!("hub {command}");
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
}

/// Maps a pipeline failure onto the outcome envelope. Rejected uploads are
/// user errors; storage and IO problems are failures.
#[must_use]
pub fn deploy_error_outcome(err: &DeployError) -> ExecutionOutcome {
    let reason = match err {
        DeployError::InvalidVersion { .. } => "invalid_version",
        DeployError::BadArchive { .. } => "bad_archive",
        DeployError::Descriptor { .. } => "bad_descriptor",
        DeployError::Unpack(_) => "unpack_failed",
        DeployError::StorageWrite { .. } => "storage_write",
        DeployError::Io(_) => "io",
    };
    let details = json!({
        "reason": reason,
        "error": error_chain(err),
    });
    match err {
        DeployError::InvalidVersion { .. }
        | DeployError::BadArchive { .. }
        | DeployError::Descriptor { .. }
        | DeployError::Unpack(_) => ExecutionOutcome::user_error(err.to_string(), details),
        DeployError::StorageWrite { .. } | DeployError::Io(_) => {
            ExecutionOutcome::failure(err.to_string(), details)
        }
    }
}

fn error_chain(err: &DeployError) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}
