//! Repository locator
//!
//! Classifies repository URIs and hands out [`DirectoryHandle`]s the
//! resolver and assembler read through without caring about the backend.
//! Share repositories go through one [`ShareSession`] per server, created on
//! first use and shared by every share on that server. On platforms that
//! reach UNC paths natively, shares are read as local paths instead.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use mespack_auth::{CredentialStore, RepositoryType};
use mespack_transport::{
    HttpRepository, ShareIndex, ShareSession, Smb2Client, SmbClient, TransportError, UncPath,
};

use crate::error::{ConfigError, MespackError};

/// A configured repository.
#[derive(Debug, Clone)]
pub enum RepositoryUri {
    Local(PathBuf),
    Http(Url),
    Share(UncPath),
}

impl RepositoryUri {
    /// Parse a repository reference. Relative local paths resolve against
    /// `base`.
    pub fn parse(raw: &str, base: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRepositoryUri {
            uri: raw.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty repository"));
        }

        if trimmed.starts_with(r"\\") || trimmed.starts_with("//") || trimmed.starts_with("smb://") {
            return UncPath::parse(trimmed)
                .map(RepositoryUri::Share)
                .ok_or_else(|| invalid("expected \\\\host\\share[\\dir]"));
        }

        if let Some(scheme) = trimmed.split_once("://").map(|(s, _)| s.to_ascii_lowercase()) {
            let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
            return match scheme.as_str() {
                "http" | "https" => Ok(RepositoryUri::Http(url)),
                "file" => url
                    .to_file_path()
                    .map(RepositoryUri::Local)
                    .map_err(|_| invalid("not a local file URL")),
                _ => Err(invalid("unsupported scheme")),
            };
        }

        let path = PathBuf::from(trimmed);
        let path = if path.is_absolute() {
            path
        } else {
            base.join(path)
        };
        Ok(RepositoryUri::Local(path))
    }

    /// Comparison key: case and trailing separators do not matter for
    /// remote locations.
    fn identity(&self) -> String {
        match self {
            RepositoryUri::Local(path) => path
                .to_string_lossy()
                .trim_end_matches(['/', '\\'])
                .to_string(),
            RepositoryUri::Http(url) => url.as_str().trim_end_matches('/').to_ascii_lowercase(),
            RepositoryUri::Share(unc) => unc.to_uri_style().to_ascii_lowercase(),
        }
    }

    pub fn same_repository(&self, other: &RepositoryUri) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Display for RepositoryUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryUri::Local(path) => write!(f, "{}", path.display()),
            RepositoryUri::Http(url) => write!(f, "{}", url),
            RepositoryUri::Share(unc) => write!(f, "{}", unc.to_native()),
        }
    }
}

/// Search order for an assembly: explicit repositories, then configured
/// ones, then the CI repository. Duplicates keep their first position,
/// except the CI repository which always moves to the end.
pub fn effective_order(
    explicit: &[RepositoryUri],
    configured: &[RepositoryUri],
    ci_repository: &RepositoryUri,
) -> Vec<RepositoryUri> {
    let mut order: Vec<RepositoryUri> = Vec::new();
    for repo in explicit.iter().chain(configured) {
        if repo.same_repository(ci_repository) || order.iter().any(|r| r.same_repository(repo)) {
            continue;
        }
        order.push(repo.clone());
    }
    order.push(ci_repository.clone());
    order
}

/// Physical location of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    Local(PathBuf),
    Http(Url),
    Share(UncPath),
}

impl ArtifactLocation {
    pub fn file_name(&self) -> Option<String> {
        match self {
            ArtifactLocation::Local(path) => {
                path.file_name().map(|n| n.to_string_lossy().into_owned())
            }
            ArtifactLocation::Http(url) => url
                .path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ArtifactLocation::Share(unc) => unc
                .path
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    /// Location string recorded for released dependencies.
    ///
    /// Shares are recorded by full path, not bare file name, so the release
    /// step can open the archive without repeating the search. Where the
    /// platform opens UNC paths natively that path is `\\host\share\...`;
    /// elsewhere it is the `//host/share/...` form.
    pub fn describe(&self, native_unc: bool) -> String {
        match self {
            ArtifactLocation::Local(path) => {
                let absolute = std::path::absolute(path).unwrap_or_else(|_| path.clone());
                absolute.display().to_string()
            }
            ArtifactLocation::Http(url) => url.to_string(),
            ArtifactLocation::Share(unc) if native_unc => unc.to_native(),
            ArtifactLocation::Share(unc) => unc.to_uri_style(),
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(false))
    }
}

/// An artifact found in a repository. Remote artifacts carry their bytes.
#[derive(Debug, Clone)]
pub struct FoundFile {
    pub location: ArtifactLocation,
    pub buffer: Option<Arc<Vec<u8>>>,
}

impl FoundFile {
    pub fn on_disk(path: PathBuf) -> Self {
        Self {
            location: ArtifactLocation::Local(path),
            buffer: None,
        }
    }

    pub fn buffered(location: ArtifactLocation, data: Vec<u8>) -> Self {
        Self {
            location,
            buffer: Some(Arc::new(data)),
        }
    }

    /// Write the artifact to `destination`, replacing any existing file.
    pub fn copy_to(&self, destination: &Path) -> io::Result<()> {
        if destination.exists() {
            std::fs::remove_file(destination)?;
        }
        match (&self.buffer, &self.location) {
            (Some(data), _) => std::fs::write(destination, data.as_slice()),
            (None, ArtifactLocation::Local(path)) => std::fs::copy(path, destination).map(|_| ()),
            (None, other) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no local copy of {}", other),
            )),
        }
    }
}

/// Uniform read access to one repository.
#[derive(Clone)]
pub enum DirectoryHandle {
    Local {
        uri: RepositoryUri,
        path: PathBuf,
    },
    Http {
        uri: RepositoryUri,
        repository: HttpRepository,
    },
    Share {
        uri: RepositoryUri,
        session: Arc<Mutex<ShareSession>>,
        index: ShareIndex,
    },
}

impl DirectoryHandle {
    pub fn uri(&self) -> &RepositoryUri {
        match self {
            DirectoryHandle::Local { uri, .. }
            | DirectoryHandle::Http { uri, .. }
            | DirectoryHandle::Share { uri, .. } => uri,
        }
    }

    /// Look up `name` in this repository. `Ok(None)` means not present (or
    /// the share is unavailable).
    pub async fn get_file(&self, name: &str) -> Result<Option<FoundFile>, TransportError> {
        match self {
            DirectoryHandle::Local { path, .. } => {
                let file = path.join(name);
                Ok(file.is_file().then(|| FoundFile::on_disk(file)))
            }
            DirectoryHandle::Http { repository, .. } => Ok(repository
                .get_file(name)
                .await?
                .map(|(url, data)| FoundFile::buffered(ArtifactLocation::Http(url), data))),
            DirectoryHandle::Share { session, index, .. } => {
                let mut session = session.lock().await;
                Ok(session
                    .get_file(*index, name)
                    .await?
                    .map(|f| FoundFile::buffered(ArtifactLocation::Share(f.location), f.data)))
            }
        }
    }
}

impl fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DirectoryHandle").field(&self.uri().to_string()).finish()
    }
}

type ClientFactory = Box<dyn Fn() -> Box<dyn SmbClient> + Send + Sync>;

/// Maps repositories to directory handles, owning the share sessions.
pub struct RepositoryLocator<'a> {
    credentials: &'a CredentialStore,
    native_unc: bool,
    sessions: HashMap<String, Arc<Mutex<ShareSession>>>,
    client_factory: ClientFactory,
}

impl<'a> RepositoryLocator<'a> {
    pub fn new(credentials: &'a CredentialStore, native_unc: bool) -> Self {
        Self {
            credentials,
            native_unc,
            sessions: HashMap::new(),
            client_factory: Box::new(|| Box::new(Smb2Client::new())),
        }
    }

    /// Use `factory` to create the SMB client of each new session.
    pub fn with_client_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SmbClient> + Send + Sync + 'static,
    {
        self.client_factory = Box::new(factory);
        self
    }

    pub fn native_unc(&self) -> bool {
        self.native_unc
    }

    pub async fn get_directory(
        &mut self,
        uri: &RepositoryUri,
    ) -> Result<DirectoryHandle, MespackError> {
        match uri {
            RepositoryUri::Local(path) => Ok(DirectoryHandle::Local {
                uri: uri.clone(),
                path: path.clone(),
            }),
            RepositoryUri::Share(unc) if self.native_unc => Ok(DirectoryHandle::Local {
                uri: uri.clone(),
                path: PathBuf::from(unc.to_native()),
            }),
            RepositoryUri::Http(url) => {
                let credential = self
                    .credentials
                    .get_credentials_for(RepositoryType::Portal, Some(url.as_str()))
                    .cloned();
                Ok(DirectoryHandle::Http {
                    uri: uri.clone(),
                    repository: HttpRepository::new(url.clone(), credential)?,
                })
            }
            RepositoryUri::Share(unc) => {
                let credential = self
                    .credentials
                    .get_credentials_for(RepositoryType::Cifs, Some(&unc.to_uri_style()))
                    .cloned();
                let session = self.session_for(unc);
                let index = {
                    let mut session = session.lock().await;
                    if let Some(credential) = credential {
                        session.offer_credential(credential);
                    }
                    session.add_folder(unc.clone())
                };
                Ok(DirectoryHandle::Share {
                    uri: uri.clone(),
                    session,
                    index,
                })
            }
        }
    }

    /// One session per server. Its credential is the first one matching any
    /// of the server's registered shares.
    fn session_for(&mut self, unc: &UncPath) -> Arc<Mutex<ShareSession>> {
        let host = unc.host.to_ascii_lowercase();
        if let Some(session) = self.sessions.get(&host) {
            return Arc::clone(session);
        }
        debug!(server = %unc.host, "new share session");
        let session = Arc::new(Mutex::new(ShareSession::new(
            unc.host.clone(),
            (self.client_factory)(),
            None,
        )));
        self.sessions.insert(host, Arc::clone(&session));
        session
    }

    /// Disconnect every share session.
    pub async fn disconnect_all(&mut self) {
        for session in self.sessions.values() {
            session.lock().await.disconnect().await;
        }
    }
}
