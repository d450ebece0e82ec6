//! Credential acquisition
//!
//! Turns a login request into a [`Credential`], either through the backend's
//! automatic login or from explicit arguments and prompts, applying the
//! backend's auth-type, key and domain policy on the way.

use std::fmt;

use tracing::{debug, warn};

use crate::credential::{AuthType, Credential, RepositoryType};
use crate::error::CredentialError;
use crate::prompt::Prompter;
use crate::store::CredentialStore;
use crate::Result;

/// Everything the caller supplied for one login.
#[derive(Default, Clone)]
pub struct LoginRequest {
    /// Defaults to [`RepositoryType::Portal`]
    pub repository_type: Option<RepositoryType>,
    pub repository: Option<String>,
    pub auth_type: Option<AuthType>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub token: Option<String>,
    pub key: Option<String>,
    /// Ask for missing values instead of failing
    pub interactive: bool,
}

impl LoginRequest {
    pub fn new(repository_type: RepositoryType) -> Self {
        Self {
            repository_type: Some(repository_type),
            ..Self::default()
        }
    }

    fn has_explicit_secret(&self) -> bool {
        self.auth_type.is_some()
            || self.username.is_some()
            || self.password.is_some()
            || self.token.is_some()
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("LoginRequest")
            .field("repository_type", &self.repository_type)
            .field("repository", &self.repository)
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("domain", &self.domain)
            .field("token", &redact(&self.token))
            .field("key", &self.key)
            .field("interactive", &self.interactive)
            .finish()
    }
}

impl CredentialStore {
    /// Acquire a credential for `request`.
    pub async fn resolve(
        &self,
        request: LoginRequest,
        prompter: &mut dyn Prompter,
    ) -> Result<Credential> {
        let repository_type = request.repository_type.unwrap_or(RepositoryType::Portal);
        let backend = self.get_repository_backend(repository_type)?;
        let descriptor = backend.descriptor();
        let repository = request
            .repository
            .clone()
            .or_else(|| descriptor.default_repository.clone());

        if backend.supports_automatic_login() && !request.has_explicit_secret() {
            debug!(%repository_type, "using automatic login");
            return backend.automatic_login(repository.as_deref()).await;
        }

        let supported = &descriptor.supported_auth_types;
        if supported.is_empty() {
            return Err(CredentialError::NoAuthSupported(repository_type));
        }

        if let Some(token) = request.token.as_deref() {
            if token.parse::<AuthType>().is_ok() {
                warn!(
                    "Noticed that you specified a token value as \"-t {token}\". If you meant to specify the auth type, use \"-T {token}\" instead."
                );
            }
        }

        let auth_type = match request.auth_type {
            Some(requested) if !supported.contains(&requested) => {
                return Err(CredentialError::UnsupportedAuthType {
                    repository_type,
                    requested,
                    supported: supported.clone(),
                });
            }
            Some(requested) => requested,
            None if supported.len() > 1 => {
                return Err(CredentialError::AmbiguousAuthType {
                    repository_type,
                    supported: supported.clone(),
                });
            }
            None => supported[0],
        };

        descriptor.key_requirement.validate(
            "Option \"key\"",
            request.key.as_deref(),
            repository_type,
        )?;

        let interactive = request.interactive;
        let credential = match auth_type {
            AuthType::Basic => {
                let username = value_or_prompt(request.username, "Username", interactive, prompter)?;
                let password = value_or_prompt(request.password, "Password", interactive, prompter)?;
                descriptor.domain_requirement.validate(
                    "Option \"domain\"",
                    request.domain.as_deref(),
                    repository_type,
                )?;
                Credential::basic(
                    repository_type,
                    repository,
                    request.key,
                    request.domain,
                    username,
                    password,
                )
            }
            AuthType::Bearer => {
                let token = value_or_prompt(request.token, "Token", interactive, prompter)?;
                Credential::bearer(repository_type, repository, request.key, token)
            }
        };
        debug!(%repository_type, %auth_type, "credential acquired");
        Ok(credential)
    }
}

fn value_or_prompt(
    value: Option<String>,
    label: &str,
    interactive: bool,
    prompter: &mut dyn Prompter,
) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None if interactive => Ok(prompter.prompt(label)?),
        None => Err(CredentialError::MissingArgument(label.to_string())),
    }
}
