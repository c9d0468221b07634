//! Error types for the control-plane client.

use thiserror::Error;

/// Failures surfaced by a single control-plane call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClientError {
    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Message from the HTTP stack.
        message: String,
    },
    /// The control plane answered with a non-success status.
    #[error("control plane rejected the request with status {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body, kept for diagnostics.
        body: String,
    },
    /// The addressed resource does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Resource kind (for example `vm`).
        resource: String,
        /// Identifier that was looked up.
        id: String,
    },
    /// A success response carried a body that could not be decoded.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Decoder error message.
        message: String,
    },
}

impl ClientError {
    /// Returns `true` for the distinguished "not found" outcome.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode {
            message: value.to_string(),
        }
    }
}
