//! Execution context
//!
//! Built once per run and passed by reference to the locator and the
//! assembler.

use std::path::{Path, PathBuf};

use mespack_auth::CredentialStore;

use crate::config::RepositoriesConfig;
use crate::error::Result;

pub struct ExecutionContext {
    working_dir: PathBuf,
    repositories: RepositoriesConfig,
    credentials: CredentialStore,
    native_unc: bool,
}

impl ExecutionContext {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        repositories: RepositoriesConfig,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            repositories,
            credentials,
            native_unc: cfg!(windows),
        }
    }

    /// Load the repositories configuration from `working_dir` and the
    /// credential store from its default location.
    pub fn load(working_dir: impl Into<PathBuf>) -> Result<Self> {
        let working_dir = working_dir.into();
        let repositories = RepositoriesConfig::load(&working_dir)?;
        let credentials = CredentialStore::load_default()?;
        Ok(Self::new(working_dir, repositories, credentials))
    }

    /// Override platform detection of native UNC path support.
    pub fn with_native_unc(mut self, native_unc: bool) -> Self {
        self.native_unc = native_unc;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn repositories(&self) -> &RepositoriesConfig {
        &self.repositories
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    pub fn native_unc(&self) -> bool {
        self.native_unc
    }
}
