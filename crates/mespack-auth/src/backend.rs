//! Repository credential backends
//!
//! Each repository type is served by one [`RepositoryBackend`]. What a backend
//! accepts (auth kinds, key and domain policy) is plain data in its
//! [`BackendDescriptor`]; the login flow in [`crate::resolve`] reads that data
//! instead of branching on the repository type.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::credential::{AuthType, Credential, PropertyRequirement, RepositoryType};
use crate::error::CredentialError;

/// Default address of the customer portal.
pub const PORTAL_REPOSITORY: &str = "https://portal.mespack.io";

/// Environment variable carrying an existing portal session token.
pub const PORTAL_TOKEN_ENV: &str = "MESPACK_PORTAL_TOKEN";

/// Static description of what a backend accepts.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    pub repository_type: RepositoryType,
    pub supported_auth_types: Vec<AuthType>,
    pub key_requirement: PropertyRequirement,
    pub domain_requirement: PropertyRequirement,
    /// Repository used when the caller names none
    pub default_repository: Option<String>,
}

/// A repository type's credential policy, plus its optional automatic login.
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    fn repository_type(&self) -> RepositoryType {
        self.descriptor().repository_type
    }

    /// Whether [`RepositoryBackend::automatic_login`] can produce a credential
    /// without user input.
    fn supports_automatic_login(&self) -> bool {
        false
    }

    /// Exchange an existing session for a credential. Never prompts.
    async fn automatic_login(
        &self,
        repository: Option<&str>,
    ) -> Result<Credential, CredentialError> {
        let _ = repository;
        Err(CredentialError::AutomaticLoginFailed {
            repository_type: self.repository_type(),
            reason: "automatic login is not supported".to_string(),
        })
    }
}

/// Backend whose behavior is fully described by its descriptor.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    descriptor: BackendDescriptor,
}

impl StaticBackend {
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl RepositoryBackend for StaticBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }
}

/// Customer portal backend. Logs in automatically by reusing the portal
/// session token found in the environment or in the session file.
#[derive(Debug, Clone)]
pub struct PortalBackend {
    descriptor: BackendDescriptor,
    token_env: String,
    token_file: Option<PathBuf>,
}

impl PortalBackend {
    pub fn new() -> Self {
        Self {
            descriptor: BackendDescriptor {
                repository_type: RepositoryType::Portal,
                supported_auth_types: vec![AuthType::Bearer],
                key_requirement: PropertyRequirement::Ignored,
                domain_requirement: PropertyRequirement::Ignored,
                default_repository: Some(PORTAL_REPOSITORY.to_string()),
            },
            token_env: PORTAL_TOKEN_ENV.to_string(),
            token_file: dirs::home_dir().map(|h| h.join(".mespack").join("portal-token")),
        }
    }

    /// Read the session token from a specific file instead of the default.
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Read the session token from a specific environment variable.
    pub fn with_token_env(mut self, name: impl Into<String>) -> Self {
        self.token_env = name.into();
        self
    }

    fn session_token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(&self.token_env) {
            let token = token.trim().to_string();
            if !token.is_empty() {
                debug!(source = %self.token_env, "using portal session token from environment");
                return Some(token);
            }
        }
        let path = self.token_file.as_ref()?;
        let token = std::fs::read_to_string(path).ok()?.trim().to_string();
        if token.is_empty() {
            return None;
        }
        debug!(source = %path.display(), "using portal session token from file");
        Some(token)
    }
}

impl Default for PortalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositoryBackend for PortalBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn supports_automatic_login(&self) -> bool {
        true
    }

    async fn automatic_login(
        &self,
        repository: Option<&str>,
    ) -> Result<Credential, CredentialError> {
        let token = self
            .session_token()
            .ok_or_else(|| CredentialError::AutomaticLoginFailed {
                repository_type: RepositoryType::Portal,
                reason: format!(
                    "no portal session found; set {} or pass a token explicitly",
                    self.token_env
                ),
            })?;
        let repository = repository
            .map(str::to_string)
            .or_else(|| self.descriptor.default_repository.clone());
        Ok(Credential::bearer(
            RepositoryType::Portal,
            repository,
            None,
            token,
        ))
    }
}

fn static_backend(
    repository_type: RepositoryType,
    supported_auth_types: Vec<AuthType>,
    key_requirement: PropertyRequirement,
    domain_requirement: PropertyRequirement,
) -> Arc<dyn RepositoryBackend> {
    Arc::new(StaticBackend::new(BackendDescriptor {
        repository_type,
        supported_auth_types,
        key_requirement,
        domain_requirement,
        default_repository: None,
    }))
}

/// Backends registered on every new store.
pub fn builtin_backends() -> Vec<Arc<dyn RepositoryBackend>> {
    use PropertyRequirement::{Ignored, Optional};

    vec![
        Arc::new(PortalBackend::new()),
        static_backend(
            RepositoryType::Npm,
            vec![AuthType::Basic, AuthType::Bearer],
            Optional,
            Ignored,
        ),
        static_backend(RepositoryType::NuGet, vec![AuthType::Basic], Optional, Ignored),
        static_backend(RepositoryType::Docker, vec![AuthType::Basic], Ignored, Ignored),
        static_backend(RepositoryType::Cifs, vec![AuthType::Basic], Ignored, Optional),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_backends_cover_every_repository_type() {
        let backends = builtin_backends();
        for ty in RepositoryType::ALL {
            assert!(
                backends.iter().any(|b| b.repository_type() == ty),
                "missing backend for {ty}"
            );
        }
    }

    #[test]
    fn test_cifs_accepts_domain_but_not_key() {
        let backends = builtin_backends();
        let cifs = backends
            .iter()
            .find(|b| b.repository_type() == RepositoryType::Cifs)
            .unwrap();
        let d = cifs.descriptor();
        assert_eq!(d.supported_auth_types, vec![AuthType::Basic]);
        assert_eq!(d.domain_requirement, PropertyRequirement::Optional);
        assert_eq!(d.key_requirement, PropertyRequirement::Ignored);
    }

    #[tokio::test]
    async fn test_portal_automatic_login_reads_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("portal-token");
        std::fs::write(&file, "session-abc\n").unwrap();
        let portal = PortalBackend::new()
            .with_token_env("MESPACK_TEST_PORTAL_TOKEN_UNSET")
            .with_token_file(&file);

        let cred = portal.automatic_login(None).await.unwrap();
        assert_eq!(cred.auth_type(), AuthType::Bearer);
        assert_eq!(cred.repository.as_deref(), Some(PORTAL_REPOSITORY));
        assert_eq!(
            cred.secret,
            crate::credential::Secret::Bearer {
                token: "session-abc".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_portal_automatic_login_without_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let portal = PortalBackend::new()
            .with_token_env("MESPACK_TEST_PORTAL_TOKEN_UNSET")
            .with_token_file(dir.path().join("absent"));

        let err = portal.automatic_login(None).await.unwrap_err();
        assert!(matches!(err, CredentialError::AutomaticLoginFailed { .. }));
    }

    #[tokio::test]
    async fn test_static_backend_has_no_automatic_login() {
        let npm = static_backend(
            RepositoryType::Npm,
            vec![AuthType::Basic],
            PropertyRequirement::Optional,
            PropertyRequirement::Ignored,
        );
        assert!(!npm.supports_automatic_login());
        assert!(npm.automatic_login(None).await.is_err());
    }
}
