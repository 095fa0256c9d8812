//! Error types for the sync client.

use crate::config::ConfigError;
use avsync_core::{TransportError, ValidationError, WriteResponse};

/// An operation that cannot start or continue given the current state.
///
/// Always fatal to the one operation and never touches the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("Table is empty; add one row to anchor new tasks")]
    EmptyTable,
    #[error("Content unit was created but no id was returned")]
    MissingNewBlockId,
    #[error("Content unit creation returned nothing")]
    ContentUnitCreationFailed,
    #[error("No source configured{}", .0.as_deref().map(|id| format!(" for {}", id)).unwrap_or_default())]
    MissingSource(Option<String>),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Write rejected with code {code}: {message}")]
    WriteRejected {
        code: i64,
        message: String,
        response: WriteResponse,
    },
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SyncError {
    pub fn rejected(response: WriteResponse) -> Self {
        Self::WriteRejected {
            code: response.code,
            message: response.msg.clone(),
            response,
        }
    }

    /// Message for the notification channel.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Transport(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}
