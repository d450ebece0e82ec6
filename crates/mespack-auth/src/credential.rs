//! Credential data model
//!
//! A [`Credential`] binds a secret (Basic or Bearer) to a repository type, an
//! optional repository URI (absent means "every repository of this type")
//! and an optional backend-specific key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// Kind of package repository a credential is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    Portal,
    Npm,
    NuGet,
    Docker,
    Cifs,
}

impl RepositoryType {
    pub const ALL: [RepositoryType; 5] = [
        RepositoryType::Portal,
        RepositoryType::Npm,
        RepositoryType::NuGet,
        RepositoryType::Docker,
        RepositoryType::Cifs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::Portal => "portal",
            RepositoryType::Npm => "npm",
            RepositoryType::NuGet => "nuget",
            RepositoryType::Docker => "docker",
            RepositoryType::Cifs => "cifs",
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryType {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepositoryType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CredentialError::UnknownRepositoryType(s.to_string()))
    }
}

/// Authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Basic,
    Bearer,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Basic => f.write_str("basic"),
            AuthType::Bearer => f.write_str("bearer"),
        }
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthType::Basic),
            "bearer" => Ok(AuthType::Bearer),
            other => Err(format!("unknown auth type: {}", other)),
        }
    }
}

/// Secret material of a credential, tagged by auth type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "authType", rename_all = "lowercase")]
pub enum Secret {
    Basic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Basic {
                domain, username, ..
            } => f
                .debug_struct("Basic")
                .field("domain", domain)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Secret::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// A stored or freshly acquired repository credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub repository_type: RepositoryType,
    /// Repository URI, or `None` for a type-wide credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub secret: Secret,
}

impl Credential {
    pub fn basic(
        repository_type: RepositoryType,
        repository: Option<String>,
        key: Option<String>,
        domain: Option<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            repository_type,
            repository,
            key,
            secret: Secret::Basic {
                domain,
                username: username.into(),
                password: password.into(),
            },
        }
    }

    pub fn bearer(
        repository_type: RepositoryType,
        repository: Option<String>,
        key: Option<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            repository_type,
            repository,
            key,
            secret: Secret::Bearer {
                token: token.into(),
            },
        }
    }

    pub fn auth_type(&self) -> AuthType {
        match self.secret {
            Secret::Basic { .. } => AuthType::Basic,
            Secret::Bearer { .. } => AuthType::Bearer,
        }
    }

    /// Two credentials occupy the same slot when type, repository and key agree.
    pub fn same_slot(&self, other: &Credential) -> bool {
        self.repository_type == other.repository_type
            && normalize_uri(self.repository.as_deref()) == normalize_uri(other.repository.as_deref())
            && self.key == other.key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Credential");
        s.field("repository_type", &self.repository_type)
            .field("repository", &self.repository)
            .field("key", &self.key);
        match &self.secret {
            Secret::Basic {
                domain, username, ..
            } => s
                .field("auth_type", &AuthType::Basic)
                .field("domain", domain)
                .field("username", username)
                .field("password", &"<redacted>"),
            Secret::Bearer { .. } => s
                .field("auth_type", &AuthType::Bearer)
                .field("token", &"<redacted>"),
        };
        s.finish()
    }
}

/// How a backend treats an optional login property such as key or domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyRequirement {
    Required,
    Optional,
    Ignored,
}

impl PropertyRequirement {
    /// Validate a property value against this requirement.
    pub fn validate(
        self,
        property: &str,
        value: Option<&str>,
        repository_type: RepositoryType,
    ) -> Result<(), CredentialError> {
        let present = value.is_some_and(|v| !v.is_empty());
        let reason = match (self, present) {
            (PropertyRequirement::Required, false) => "is required",
            (PropertyRequirement::Ignored, true) => "is not supported",
            _ => return Ok(()),
        };
        Err(CredentialError::InvalidPropertyUsage {
            property: property.to_string(),
            repository_type,
            reason,
        })
    }
}

/// Lowercase, forward-slash, trailing-separator-free form used for URI
/// comparisons.
pub(crate) fn normalize_uri(uri: Option<&str>) -> Option<String> {
    uri.map(|u| {
        u.replace('\\', "/")
            .trim_end_matches('/')
            .to_ascii_lowercase()
    })
}
