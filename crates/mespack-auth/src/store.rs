//! Local credential store
//!
//! Credentials live in one JSON file. Entries are keyed by
//! (repository type, repository URI, key); saving upserts by that slot and
//! rewrites the file atomically. Credentials injected through
//! `MESPACK_AUTH__*` environment variables overlay the file and are never
//! written back.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::backend::{builtin_backends, RepositoryBackend};
use crate::credential::{normalize_uri, Credential, RepositoryType};
use crate::error::CredentialError;
use crate::Result;

/// Prefix of environment variables carrying serialized credentials.
pub const ENV_PREFIX: &str = "MESPACK_AUTH__";

/// Environment variable overriding the credential file location.
pub const AUTH_FILE_ENV: &str = "MESPACK_AUTH_FILE";

const AUTH_FILE_NAME: &str = ".mespack-auth.json";

/// Pushes saved credentials into a downstream tool's own credential file.
pub trait DownstreamSync: Send + Sync {
    /// Target name used in logs and reports.
    fn name(&self) -> &str;

    fn sync(&self, credentials: &[Credential]) -> Result<()>;
}

/// Outcome of [`CredentialStore::save`].
#[derive(Debug)]
pub struct SaveReport {
    pub path: PathBuf,
    /// Number of credentials written to the local file
    pub stored: usize,
    /// Downstream targets that failed, with their error
    pub sync_failures: Vec<(String, CredentialError)>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.sync_failures.is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    credentials: Vec<Credential>,
}

/// Registered backends plus the persisted and environment credentials.
pub struct CredentialStore {
    path: PathBuf,
    backends: BTreeMap<RepositoryType, Arc<dyn RepositoryBackend>>,
    stored: Vec<Credential>,
    overlay: Vec<Credential>,
    sync_targets: Vec<Box<dyn DownstreamSync>>,
}

impl CredentialStore {
    /// Empty store backed by `path`, with the built-in backends registered.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut store = Self {
            path: path.into(),
            backends: BTreeMap::new(),
            stored: Vec::new(),
            overlay: Vec::new(),
            sync_targets: Vec::new(),
        };
        for backend in builtin_backends() {
            store.register_backend(backend);
        }
        store
    }

    /// `$MESPACK_AUTH_FILE`, else `~/.mespack-auth.json`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(AUTH_FILE_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        dirs::home_dir()
            .map(|home| home.join(AUTH_FILE_NAME))
            .ok_or_else(|| CredentialError::Location("home directory not found".to_string()))
    }

    /// Load the store from `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);
        match fs::read_to_string(&store.path) {
            Ok(text) => {
                let file: CredentialFile = serde_json::from_str(&text)?;
                debug!(
                    path = %store.path.display(),
                    count = file.credentials.len(),
                    "loaded credential file"
                );
                store.stored = file.credentials;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %store.path.display(), "no credential file yet");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(store)
    }

    /// Load from the default location and overlay the process environment.
    pub fn load_default() -> Result<Self> {
        let mut store = Self::load(Self::default_path()?)?;
        store.merge_env(std::env::vars());
        Ok(store)
    }

    /// Overlay credentials found in `MESPACK_AUTH__*` variables. Malformed
    /// entries are skipped with a warning.
    pub fn merge_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if !name.starts_with(ENV_PREFIX) {
                continue;
            }
            match decode_env_value(&value) {
                Ok(cred) => {
                    debug!(variable = %name, repository_type = %cred.repository_type, "credential from environment");
                    upsert(&mut self.overlay, cred);
                }
                Err(e) => warn!(variable = %name, error = %e, "ignoring malformed credential variable"),
            }
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn RepositoryBackend>) -> Self {
        self.register_backend(backend);
        self
    }

    pub fn register_backend(&mut self, backend: Arc<dyn RepositoryBackend>) {
        self.backends.insert(backend.repository_type(), backend);
    }

    pub fn with_sync_target(mut self, target: Box<dyn DownstreamSync>) -> Self {
        self.sync_targets.push(target);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_repository_backend(
        &self,
        repository_type: RepositoryType,
    ) -> Result<Arc<dyn RepositoryBackend>> {
        self.backends
            .get(&repository_type)
            .cloned()
            .ok_or_else(|| CredentialError::UnknownRepositoryType(repository_type.to_string()))
    }

    /// Every known credential, environment entries first.
    pub fn credentials(&self) -> impl Iterator<Item = &Credential> {
        self.overlay.iter().chain(self.stored.iter())
    }

    /// Best credential for `uri`: exact URI, then the longest stored URI that
    /// prefixes it, then a type-wide entry.
    pub fn get_credentials_for(
        &self,
        repository_type: RepositoryType,
        uri: Option<&str>,
    ) -> Option<&Credential> {
        let wanted = normalize_uri(uri);
        let mut best: Option<(usize, &Credential)> = None;

        for cred in self.credentials().filter(|c| c.repository_type == repository_type) {
            let rank = match (normalize_uri(cred.repository.as_deref()), &wanted) {
                (None, _) => 0,
                (Some(have), Some(want)) if &have == want => usize::MAX,
                (Some(have), Some(want)) if is_path_prefix(&have, want) => have.len(),
                _ => continue,
            };
            if best.map_or(true, |(r, _)| rank > r) {
                best = Some((rank, cred));
            }
        }
        best.map(|(_, cred)| cred)
    }

    /// Upsert `credentials` into the local file, then (if `sync`) push the
    /// full set to every downstream target. A failed target is reported, the
    /// local write stands.
    pub fn save(&mut self, credentials: &[Credential], sync: bool) -> Result<SaveReport> {
        for cred in credentials {
            upsert(&mut self.stored, cred.clone());
        }
        self.write_file()?;
        info!(
            path = %self.path.display(),
            saved = credentials.len(),
            "credentials stored"
        );

        let mut report = SaveReport {
            path: self.path.clone(),
            stored: self.stored.len(),
            sync_failures: Vec::new(),
        };
        if !sync {
            return Ok(report);
        }
        for target in &self.sync_targets {
            match target.sync(&self.stored) {
                Ok(()) => debug!(target = target.name(), "credentials synced"),
                Err(e) => {
                    warn!(target = target.name(), error = %e, "credential sync failed");
                    report.sync_failures.push((target.name().to_string(), e));
                }
            }
        }
        Ok(report)
    }

    fn write_file(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file = CredentialFile {
            credentials: self.stored.clone(),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &file)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// `NAME=value` pairs that reproduce `credentials` through [`CredentialStore::merge_env`].
/// Names are `MESPACK_AUTH__<TYPE>__<REPOSITORY>__<KEY>`, suffixed when two
/// slots still slug to the same name.
pub fn generate_env_vars(credentials: &[Credential]) -> Result<Vec<(String, String)>> {
    let mut taken: HashSet<String> = HashSet::new();
    credentials
        .iter()
        .map(|cred| -> Result<(String, String)> {
            let base = format!(
                "{}{}__{}",
                ENV_PREFIX,
                cred.repository_type.as_str().to_ascii_uppercase(),
                slot_slug(cred)
            );
            let mut name = base.clone();
            let mut n = 1;
            while !taken.insert(name.clone()) {
                n += 1;
                name = format!("{base}_{n}");
            }
            let value = STANDARD.encode(serde_json::to_vec(cred)?);
            Ok((name, value))
        })
        .collect()
}

fn slot_slug(cred: &Credential) -> String {
    let parts: Vec<String> = [cred.repository.as_deref(), cred.key.as_deref()]
        .into_iter()
        .flatten()
        .map(env_slug)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        "DEFAULT".to_string()
    } else {
        parts.join("__")
    }
}

fn decode_env_value(value: &str) -> std::result::Result<Credential, String> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| format!("invalid base64: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid credential: {e}"))
}

fn env_slug(raw: &str) -> String {
    let slug: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    slug.trim_matches('_').to_string()
}

fn upsert(list: &mut Vec<Credential>, cred: Credential) {
    match list.iter_mut().find(|c| c.same_slot(&cred)) {
        Some(existing) => *existing = cred,
        None => list.push(cred),
    }
}

/// `prefix` covers `uri` up to a path boundary.
fn is_path_prefix(prefix: &str, uri: &str) -> bool {
    uri.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}
