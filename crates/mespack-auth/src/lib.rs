//! mespack-auth: repository credentials
//!
//! Acquires, stores and looks up credentials for package repositories.
//!
//! ## Layer 0 - Credentials
//!
//! ## Key Components
//!
//! - `Credential`: Basic or Bearer secret bound to a repository type and URI
//! - `RepositoryBackend`: per-type policy (auth kinds, key/domain rules, automatic login)
//! - `CredentialStore`: file-backed store with env overlay and downstream sync

pub mod backend;
mod credential;
mod error;
pub mod fakes;
mod prompt;
mod resolve;
mod store;

pub use backend::{
    builtin_backends, BackendDescriptor, PortalBackend, RepositoryBackend, StaticBackend,
    PORTAL_REPOSITORY,
};
pub use credential::{AuthType, Credential, PropertyRequirement, RepositoryType, Secret};
pub use error::CredentialError;
pub use prompt::{Prompter, StdinPrompter};
pub use resolve::LoginRequest;
pub use store::{
    generate_env_vars, CredentialStore, DownstreamSync, SaveReport, AUTH_FILE_ENV, ENV_PREFIX,
};

/// Result type for credential operations
pub type Result<T> = std::result::Result<T, CredentialError>;
