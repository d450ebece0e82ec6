//! SMB2 client
//!
//! A read-only SMB 2.0.2 / 2.1 client: negotiate, NTLMv2 session setup, tree
//! connect, open, chunked read, close. [`SmbClient`] is the seam the share
//! session is written against; [`Smb2Client`] is the TCP implementation.

mod client;
pub(crate) mod ntlm;
pub(crate) mod wire;

use std::fmt;

use async_trait::async_trait;

use crate::Result;

pub use client::Smb2Client;

/// Upper bound for a single READ request.
pub const MAX_READ_SIZE: u32 = 64 * 1024;

/// NT status code returned by the server.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: NtStatus = NtStatus(0x0000_0000);
    pub const PENDING: NtStatus = NtStatus(0x0000_0103);
    pub const MORE_PROCESSING_REQUIRED: NtStatus = NtStatus(0xC000_0016);
    pub const END_OF_FILE: NtStatus = NtStatus(0xC000_0011);
    pub const ACCESS_DENIED: NtStatus = NtStatus(0xC000_0022);
    pub const OBJECT_NAME_NOT_FOUND: NtStatus = NtStatus(0xC000_0034);
    pub const OBJECT_PATH_NOT_FOUND: NtStatus = NtStatus(0xC000_003A);
    pub const LOGON_FAILURE: NtStatus = NtStatus(0xC000_006D);
    pub const BAD_NETWORK_NAME: NtStatus = NtStatus(0xC000_00CC);

    pub fn is_success(self) -> bool {
        self == NtStatus::SUCCESS
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            NtStatus::SUCCESS => "STATUS_SUCCESS",
            NtStatus::PENDING => "STATUS_PENDING",
            NtStatus::MORE_PROCESSING_REQUIRED => "STATUS_MORE_PROCESSING_REQUIRED",
            NtStatus::END_OF_FILE => "STATUS_END_OF_FILE",
            NtStatus::ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            NtStatus::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            NtStatus::OBJECT_PATH_NOT_FOUND => "STATUS_OBJECT_PATH_NOT_FOUND",
            NtStatus::LOGON_FAILURE => "STATUS_LOGON_FAILURE",
            NtStatus::BAD_NETWORK_NAME => "STATUS_BAD_NETWORK_NAME",
            _ => return None,
        })
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Handle of a connected share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub u32);

/// Handle of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub [u8; 16]);

/// Operations the share session needs from an SMB client.
///
/// Every method except `disconnect` reports server rejections as
/// [`crate::TransportError::Status`].
#[async_trait]
pub trait SmbClient: Send {
    /// Open the transport and negotiate a dialect.
    async fn connect(&mut self, server: &str) -> Result<()>;

    async fn login(&mut self, domain: Option<&str>, username: &str, password: &str) -> Result<()>;

    async fn tree_connect(&mut self, share: &str) -> Result<TreeId>;

    /// Open an existing file for shared reading. `path` is relative to the
    /// share root, `\`-separated.
    async fn open_file(&mut self, tree: TreeId, path: &str) -> Result<FileId>;

    /// Read up to `length` bytes at `offset`. End of file is reported as
    /// [`NtStatus::END_OF_FILE`] or as an empty chunk.
    async fn read_file(
        &mut self,
        tree: TreeId,
        file: FileId,
        offset: u64,
        length: u32,
    ) -> Result<Vec<u8>>;

    async fn close_file(&mut self, tree: TreeId, file: FileId) -> Result<()>;

    /// Largest chunk a single read may request.
    fn max_read_size(&self) -> u32;

    /// Log off and drop the transport. Never fails.
    async fn disconnect(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_uses_known_names() {
        assert_eq!(NtStatus::END_OF_FILE.to_string(), "STATUS_END_OF_FILE");
        assert_eq!(NtStatus(0xC000_0001).to_string(), "0xC0000001");
    }
}
