//! In-memory SMB client fake (testing only)

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::smb::{FileId, NtStatus, SmbClient, TreeId};
use crate::Result;

/// Calls observed by a [`ScriptedSmbClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmbCalls {
    pub connects: usize,
    pub logins: usize,
    pub tree_connects: Vec<String>,
    pub opens: Vec<String>,
    pub reads: usize,
    pub closes: usize,
    pub disconnects: usize,
}

#[derive(Debug, Default)]
struct Server {
    /// share -> (path -> contents), paths `\`-separated
    shares: HashMap<String, HashMap<String, Vec<u8>>>,
    /// paths whose reads fail after opening
    broken: Vec<String>,
}

/// Serves files from memory. Clones share the same call log.
#[derive(Debug, Clone)]
pub struct ScriptedSmbClient {
    server: Arc<Mutex<Server>>,
    calls: Arc<Mutex<SmbCalls>>,
    accept_connect: bool,
    accept_login: bool,
    max_read: u32,
    trees: Vec<String>,
    open: HashMap<[u8; 16], String>,
}

impl ScriptedSmbClient {
    pub fn new() -> Self {
        Self {
            server: Arc::default(),
            calls: Arc::default(),
            accept_connect: true,
            accept_login: true,
            max_read: 4,
            trees: Vec::new(),
            open: HashMap::new(),
        }
    }

    /// Add a file; `path` is relative to the share root, either separator.
    pub fn with_file(self, share: &str, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.server
            .lock()
            .unwrap()
            .shares
            .entry(share.to_string())
            .or_default()
            .insert(path.replace('/', "\\"), contents.into());
        self
    }

    /// Declare a share with no files.
    pub fn with_share(self, share: &str) -> Self {
        self.server
            .lock()
            .unwrap()
            .shares
            .entry(share.to_string())
            .or_default();
        self
    }

    /// Make reads of `path` fail with an access error.
    pub fn with_broken_file(self, share: &str, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        let this = self.with_file(share, path, contents);
        this.server
            .lock()
            .unwrap()
            .broken
            .push(path.replace('/', "\\"));
        this
    }

    pub fn rejecting_connect(mut self) -> Self {
        self.accept_connect = false;
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.accept_login = false;
        self
    }

    /// Chunk size reported as the negotiated maximum.
    pub fn with_max_read(mut self, max_read: u32) -> Self {
        self.max_read = max_read;
        self
    }

    pub fn calls(&self) -> SmbCalls {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for ScriptedSmbClient {
    fn default() -> Self {
        Self::new()
    }
}

fn status(command: &'static str, status: NtStatus) -> TransportError {
    TransportError::Status { command, status }
}

#[async_trait]
impl SmbClient for ScriptedSmbClient {
    async fn connect(&mut self, _server: &str) -> Result<()> {
        self.calls.lock().unwrap().connects += 1;
        if self.accept_connect {
            Ok(())
        } else {
            Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    async fn login(&mut self, _domain: Option<&str>, _username: &str, _password: &str) -> Result<()> {
        self.calls.lock().unwrap().logins += 1;
        if self.accept_login {
            Ok(())
        } else {
            Err(status("SESSION_SETUP", NtStatus::LOGON_FAILURE))
        }
    }

    async fn tree_connect(&mut self, share: &str) -> Result<TreeId> {
        self.calls.lock().unwrap().tree_connects.push(share.to_string());
        if !self.server.lock().unwrap().shares.contains_key(share) {
            return Err(status("TREE_CONNECT", NtStatus::BAD_NETWORK_NAME));
        }
        self.trees.push(share.to_string());
        Ok(TreeId(self.trees.len() as u32))
    }

    async fn open_file(&mut self, tree: TreeId, path: &str) -> Result<FileId> {
        self.calls.lock().unwrap().opens.push(path.to_string());
        let share = self
            .trees
            .get((tree.0 as usize).wrapping_sub(1))
            .cloned()
            .ok_or_else(|| status("CREATE", NtStatus::ACCESS_DENIED))?;
        let exists = self
            .server
            .lock()
            .unwrap()
            .shares
            .get(&share)
            .is_some_and(|files| files.contains_key(path));
        if !exists {
            return Err(status("CREATE", NtStatus::OBJECT_NAME_NOT_FOUND));
        }
        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&(self.open.len() as u64 + 1).to_le_bytes());
        self.open.insert(id, format!("{share}|{path}"));
        Ok(FileId(id))
    }

    async fn read_file(
        &mut self,
        _tree: TreeId,
        file: FileId,
        offset: u64,
        length: u32,
    ) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().reads += 1;
        let key = self
            .open
            .get(&file.0)
            .cloned()
            .ok_or_else(|| status("READ", NtStatus::ACCESS_DENIED))?;
        let (share, path) = key.split_once('|').unwrap_or_default();
        let server = self.server.lock().unwrap();
        if server.broken.iter().any(|b| b == path) {
            return Err(status("READ", NtStatus::ACCESS_DENIED));
        }
        let data = server
            .shares
            .get(share)
            .and_then(|files| files.get(path))
            .ok_or_else(|| status("READ", NtStatus::ACCESS_DENIED))?;
        let start = offset as usize;
        if start >= data.len() {
            return Err(status("READ", NtStatus::END_OF_FILE));
        }
        let end = (start + length.min(self.max_read) as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn close_file(&mut self, _tree: TreeId, file: FileId) -> Result<()> {
        self.calls.lock().unwrap().closes += 1;
        self.open.remove(&file.0);
        Ok(())
    }

    fn max_read_size(&self) -> u32 {
        self.max_read
    }

    async fn disconnect(&mut self) {
        self.calls.lock().unwrap().disconnects += 1;
        self.trees.clear();
        self.open.clear();
    }
}
