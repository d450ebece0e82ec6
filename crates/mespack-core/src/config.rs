//! Repository configuration (`repositories.json`)

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::locator::RepositoryUri;

pub const REPOSITORIES_FILE: &str = "repositories.json";

/// Repositories configured for a working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoriesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_repository: Option<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
}

impl RepositoriesConfig {
    /// Load `repositories.json` from `dir`; a missing file is an empty
    /// configuration.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(REPOSITORIES_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no repositories configuration");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Parsed configured repositories, relative paths against `base`.
    pub fn repository_uris(&self, base: &Path) -> Result<Vec<RepositoryUri>, ConfigError> {
        self.repositories
            .iter()
            .map(|raw| RepositoryUri::parse(raw, base))
            .collect()
    }

    pub fn ci_repository_uri(&self, base: &Path) -> Result<Option<RepositoryUri>, ConfigError> {
        self.ci_repository
            .as_deref()
            .map(|raw| RepositoryUri::parse(raw, base))
            .transpose()
    }
}
