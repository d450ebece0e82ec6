//! Error taxonomy for mespack.

use std::path::PathBuf;

use mespack_auth::CredentialError;
use mespack_transport::TransportError;

use crate::model::PackageType;

/// Invalid setup detected before any work starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing mandatory option \"{0}\"")]
    MissingRepository(String),

    #[error("invalid repository \"{uri}\": {reason}")]
    InvalidRepositoryUri { uri: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The dependency graph cannot be assembled.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("{package} is a {package_type} package; only Root packages can be assembled")]
    NotARootPackage {
        package: String,
        package_type: PackageType,
    },

    #[error("Some packages were not found: {}", .0.join(", "))]
    UnresolvedDependencies(Vec<String>),

    #[error("Missing mandatory dependency {0}")]
    MissingDependencySource(String),

    #[error("Test package {0} was not found in any repository")]
    TestPackageNotFound(String),

    #[error("Package {0} was not found in any repository")]
    PackageNotFound(String),

    #[error("cyclic dependency: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("invalid manifest in {location}: {reason}")]
    InvalidManifest { location: String, reason: String },
}

/// Top-level error of a mespack run.
#[derive(Debug, thiserror::Error)]
pub enum MespackError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Unexpected failure while copying artifacts or writing the location map
    #[error("assembly failed: {message}")]
    AssemblyFailed {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl MespackError {
    pub(crate) fn assembly_failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MespackError::AssemblyFailed {
            message: err.to_string(),
            source: Box::new(err),
        }
    }

    /// Process exit status for this error category.
    pub fn exit_code(&self) -> i32 {
        match self {
            MespackError::Configuration(_) => 2,
            MespackError::Resolution(_) => 3,
            MespackError::Credential(_) => 4,
            MespackError::Transport(_) => 5,
            MespackError::AssemblyFailed { .. } => 6,
        }
    }
}

/// Result type for mespack operations.
pub type Result<T> = std::result::Result<T, MespackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_dependencies_lists_every_package() {
        let err = ResolutionError::UnresolvedDependencies(vec![
            "B@1.0".to_string(),
            "D@2.0".to_string(),
        ]);
        assert_eq!(err.to_string(), "Some packages were not found: B@1.0, D@2.0");
    }

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        let errors = [
            MespackError::from(ConfigError::MissingRepository("cirepo".to_string())),
            MespackError::from(ResolutionError::PackageNotFound("A@1.0".to_string())),
            MespackError::from(CredentialError::MissingArgument("Token".to_string())),
            MespackError::from(TransportError::Http("boom".to_string())),
            MespackError::assembly_failed(std::io::Error::other("disk full")),
        ];
        let codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(codes, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_assembly_failed_keeps_source() {
        let err = MespackError::assembly_failed(std::io::Error::other("disk full"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("disk full"));
    }
}
