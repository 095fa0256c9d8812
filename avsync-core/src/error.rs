//! Error types for avsync operations

use thiserror::Error;

/// Errors raised by a transport implementation.
///
/// Shape mismatches are never reported through this type: an unexpected
/// envelope normalizes to an empty result instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {endpoint} failed: {reason}")]
    Http { endpoint: String, reason: String },

    #[error("Remote rejected {endpoint} with code {code}: {message}")]
    Api {
        endpoint: String,
        code: i64,
        message: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl TransportError {
    /// Message suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Http { reason, .. } => reason.clone(),
            TransportError::Api { message, code, .. } => format!("{} (code {})", message, code),
            TransportError::Decode { reason, .. } => reason.clone(),
        }
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Role {role} references unknown column {key_id}")]
    UnknownColumn { role: String, key_id: String },
}

// =============================================================================
// TESTS
// =============================================================================
