//! Error types for mespack-auth

use thiserror::Error;

use crate::credential::{AuthType, RepositoryType};

/// Errors that can occur while acquiring, storing or syncing credentials
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Repository type has no registered backend
    #[error("Unknown repository type: {0}")]
    UnknownRepositoryType(String),

    /// Backend declares no authentication method at all
    #[error("Repository type \"{0}\" does not support any authentication method, please report this issue")]
    NoAuthSupported(RepositoryType),

    /// Backend supports several auth types and none was chosen
    #[error("Missing mandatory auth type for repository type \"{repository_type}\", supported values are: {}", join(.supported))]
    AmbiguousAuthType {
        repository_type: RepositoryType,
        supported: Vec<AuthType>,
    },

    /// Explicit auth type is not supported by the backend
    #[error("Invalid auth type \"{requested}\" for repository type \"{repository_type}\", supported values are: {}", join(.supported))]
    UnsupportedAuthType {
        repository_type: RepositoryType,
        requested: AuthType,
        supported: Vec<AuthType>,
    },

    /// A property was given where it is ignored, or omitted where it is required
    #[error("{property} {reason} for repository type \"{repository_type}\"")]
    InvalidPropertyUsage {
        property: String,
        repository_type: RepositoryType,
        reason: &'static str,
    },

    /// A value was needed but prompting is disabled
    #[error("Missing command argument for \"{0}\"")]
    MissingArgument(String),

    /// Backend cannot log in without user input
    #[error("Automatic login failed for repository type \"{repository_type}\": {reason}")]
    AutomaticLoginFailed {
        repository_type: RepositoryType,
        reason: String,
    },

    /// A downstream tool credential file could not be updated
    #[error("Failed to sync credentials to {target}: {reason}")]
    Sync { target: String, reason: String },

    /// Credential file could not be located
    #[error("Cannot determine credential file location: {0}")]
    Location(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn join(types: &[AuthType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_auth_type_lists_every_choice() {
        let err = CredentialError::AmbiguousAuthType {
            repository_type: RepositoryType::Npm,
            supported: vec![AuthType::Basic, AuthType::Bearer],
        };
        let msg = err.to_string();
        assert!(msg.contains("npm"));
        assert!(msg.contains("basic, bearer"));
    }

    #[test]
    fn test_missing_argument_names_the_label() {
        let err = CredentialError::MissingArgument("Password".to_string());
        assert!(err.to_string().contains("\"Password\""));
    }
}
