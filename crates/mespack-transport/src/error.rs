//! Error types for mespack-transport

use thiserror::Error;

use mespack_auth::{AuthType, RepositoryType};

use crate::smb::NtStatus;

/// Errors that can occur while talking to a share or an HTTP repository
#[derive(Error, Debug)]
pub enum TransportError {
    /// A share file was opened but could not be read to the end
    #[error("Failed to read file {path}: {status}")]
    ReadFailure { path: String, status: String },

    /// Share credentials are not username/password
    #[error("Invalid auth type \"{auth_type}\" for repository type \"{repository_type}\", expected basic")]
    InvalidAuthType {
        repository_type: RepositoryType,
        auth_type: AuthType,
    },

    /// Server answered a request with a non-success status
    #[error("{command} failed with {status}")]
    Status {
        command: &'static str,
        status: NtStatus,
    },

    /// Malformed or unexpected message on the wire
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// NTLM exchange could not be completed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// The server status carried by a [`TransportError::Status`].
    pub fn status(&self) -> Option<NtStatus> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}
