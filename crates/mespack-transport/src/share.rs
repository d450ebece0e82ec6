//! Network share sessions
//!
//! One [`ShareSession`] per file server. The session connects and logs in at
//! most once, on first access, and mounts every share it knows about. A
//! missing credential or a rejected handshake leaves the session `Failed`:
//! lookups then report "not found" instead of an error. Only
//! [`ShareSession::disconnect`] re-arms the connection.

use std::fmt;

use tracing::{debug, warn};

use mespack_auth::{Credential, RepositoryType, Secret};

use crate::error::TransportError;
use crate::smb::{SmbClient, TreeId};
use crate::Result;

/// A `\\host\share\dir` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UncPath {
    pub host: String,
    pub share: String,
    /// Directory or file below the share root, `/`-separated, no leading `/`
    pub path: String,
}

impl UncPath {
    /// Parse `\\host\share\dir`, `//host/share/dir` or `smb://host/share/dir`.
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = if let Some(rest) = raw.strip_prefix("smb://") {
            rest
        } else if raw.starts_with(r"\\") || raw.starts_with("//") {
            &raw[2..]
        } else {
            return None;
        };
        let normalized = rest.replace('\\', "/");
        let mut parts = normalized.split('/').filter(|p| !p.is_empty());
        let host = parts.next()?.to_string();
        let share = parts.next()?.to_string();
        let path = parts.collect::<Vec<_>>().join("/");
        Some(Self { host, share, path })
    }

    /// Append `name` below this location.
    pub fn join(&self, name: &str) -> Self {
        let name = name.replace('\\', "/");
        let name = name.trim_matches('/');
        let path = match (self.path.is_empty(), name.is_empty()) {
            (true, _) => name.to_string(),
            (false, true) => self.path.clone(),
            (false, false) => format!("{}/{}", self.path, name),
        };
        Self {
            host: self.host.clone(),
            share: self.share.clone(),
            path,
        }
    }

    /// `\\host\share\dir`
    pub fn to_native(&self) -> String {
        let mut out = format!(r"\\{}\{}", self.host, self.share);
        if !self.path.is_empty() {
            out.push('\\');
            out.push_str(&self.path.replace('/', "\\"));
        }
        out
    }

    /// `//host/share/dir`
    pub fn to_uri_style(&self) -> String {
        let mut out = format!("//{}/{}", self.host, self.share);
        if !self.path.is_empty() {
            out.push('/');
            out.push_str(&self.path);
        }
        out
    }

    /// Path relative to the share root as SMB expects it.
    fn share_relative(&self) -> String {
        self.path.replace('/', "\\")
    }
}

impl fmt::Display for UncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri_style())
    }
}

/// Connection state of a [`ShareSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mount {
    Pending,
    Mounted(TreeId),
    Missing,
}

/// One directory inside a share on the session's server.
#[derive(Debug, Clone)]
pub struct SharedFolder {
    location: UncPath,
    mount: Mount,
}

impl SharedFolder {
    pub fn location(&self) -> &UncPath {
        &self.location
    }

    /// `false` once a mount attempt has failed.
    pub fn exists(&self) -> bool {
        !matches!(self.mount, Mount::Missing)
    }
}

/// A file read completely from a share.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub location: UncPath,
    pub data: Vec<u8>,
}

/// Handle to a folder registered on a [`ShareSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShareIndex(usize);

/// Per-server SMB session shared by all of its folders.
pub struct ShareSession {
    host: String,
    client: Box<dyn SmbClient>,
    credential: Option<Credential>,
    state: ConnectionState,
    shares: Vec<SharedFolder>,
}

impl ShareSession {
    pub fn new(
        host: impl Into<String>,
        client: Box<dyn SmbClient>,
        credential: Option<Credential>,
    ) -> Self {
        Self {
            host: host.into(),
            client,
            credential,
            state: ConnectionState::Disconnected,
            shares: Vec::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn folder(&self, index: ShareIndex) -> Option<&SharedFolder> {
        self.shares.get(index.0)
    }

    /// Adopt `credential` unless the session already has one or is
    /// connected. A session that failed for lack of a credential becomes
    /// connectable again.
    pub fn offer_credential(&mut self, credential: Credential) -> bool {
        if self.credential.is_some() || self.state == ConnectionState::Connected {
            return false;
        }
        debug!(server = %self.host, "credential adopted for share session");
        self.credential = Some(credential);
        if self.state == ConnectionState::Failed {
            self.state = ConnectionState::Disconnected;
        }
        true
    }

    /// Register a folder on this server; registering the same location twice
    /// returns the existing handle.
    pub fn add_folder(&mut self, location: UncPath) -> ShareIndex {
        if let Some(i) = self.shares.iter().position(|s| s.location == location) {
            return ShareIndex(i);
        }
        self.shares.push(SharedFolder {
            location,
            mount: Mount::Pending,
        });
        ShareIndex(self.shares.len() - 1)
    }

    /// Connect, log in and mount all folders, once. Returns whether the
    /// session is usable. Only a non-Basic credential is an error.
    pub async fn connect(&mut self) -> Result<bool> {
        match self.state {
            ConnectionState::Connected => return Ok(true),
            ConnectionState::Failed => return Ok(false),
            ConnectionState::Disconnected => {}
        }
        let connected = self.handshake().await?;
        self.state = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Failed
        };
        if connected {
            for i in 0..self.shares.len() {
                self.mount(ShareIndex(i)).await;
            }
        }
        Ok(connected)
    }

    async fn handshake(&mut self) -> Result<bool> {
        let Some(credential) = &self.credential else {
            let shares: Vec<String> = self.shares.iter().map(|s| s.location.to_string()).collect();
            warn!(
                server = %self.host,
                shares = %shares.join(", "),
                "CIFS credentials not found for shares"
            );
            return Ok(false);
        };
        let (domain, username, password) = match &credential.secret {
            Secret::Basic {
                domain,
                username,
                password,
            } => (domain.clone(), username.clone(), password.clone()),
            Secret::Bearer { .. } => {
                return Err(TransportError::InvalidAuthType {
                    repository_type: RepositoryType::Cifs,
                    auth_type: credential.auth_type(),
                })
            }
        };

        debug!(server = %self.host, username = %username, "connecting to SMB server");
        if let Err(e) = self.client.connect(&self.host).await {
            debug!(error = %e, "smb connect failed");
            warn!(server = %self.host, "Failed to connect to server");
            return Ok(false);
        }
        if let Err(e) = self
            .client
            .login(domain.as_deref(), &username, &password)
            .await
        {
            debug!(error = %e, "smb login failed");
            warn!(server = %self.host, username = %username, "Failed to login to server");
            self.client.disconnect().await;
            return Ok(false);
        }
        Ok(true)
    }

    async fn mount(&mut self, index: ShareIndex) -> Option<TreeId> {
        let folder = self.shares.get(index.0)?;
        match folder.mount {
            Mount::Mounted(tree) => return Some(tree),
            Mount::Missing => return None,
            Mount::Pending => {}
        }
        let share = folder.location.share.clone();
        let mount = match self.client.tree_connect(&share).await {
            Ok(tree) => Mount::Mounted(tree),
            Err(e) => {
                debug!(error = %e, "tree connect failed");
                warn!(share = %share, server = %self.host, "Failed to connect to share");
                Mount::Missing
            }
        };
        self.shares[index.0].mount = mount;
        match mount {
            Mount::Mounted(tree) => Some(tree),
            _ => None,
        }
    }

    /// Read `name` from a registered folder. `Ok(None)` when the session is
    /// unavailable, the share is missing, or the file cannot be opened.
    ///
    /// The whole file is buffered in memory.
    pub async fn get_file(&mut self, index: ShareIndex, name: &str) -> Result<Option<RemoteFile>> {
        if !self.connect().await? {
            return Ok(None);
        }
        let Some(tree) = self.mount(index).await else {
            return Ok(None);
        };
        let location = match self.shares.get(index.0) {
            Some(folder) => folder.location.join(name),
            None => return Ok(None),
        };
        let relative = location.share_relative();

        let file = match self.client.open_file(tree, &relative).await {
            Ok(file) => file,
            Err(e) => {
                debug!(file = %location, error = %e, "file not available on share");
                return Ok(None);
            }
        };

        let chunk = self.client.max_read_size().max(1);
        let mut data = Vec::new();
        let outcome = loop {
            match self
                .client
                .read_file(tree, file, data.len() as u64, chunk)
                .await
            {
                Ok(bytes) if bytes.is_empty() => break Ok(()),
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(e) if e.status() == Some(crate::smb::NtStatus::END_OF_FILE) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        if let Err(e) = self.client.close_file(tree, file).await {
            debug!(file = %location, error = %e, "close failed");
        }
        if let Err(e) = outcome {
            return Err(TransportError::ReadFailure {
                path: location.to_string(),
                status: e.to_string(),
            });
        }

        debug!(file = %location, bytes = data.len(), "read file from share");
        Ok(Some(RemoteFile { location, data }))
    }

    /// Drop the connection; the next access reconnects.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Connected {
            self.client.disconnect().await;
        }
        self.state = ConnectionState::Disconnected;
        for share in &mut self.shares {
            share.mount = Mount::Pending;
        }
    }
}
