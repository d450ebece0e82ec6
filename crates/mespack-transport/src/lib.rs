//! mespack-transport: repository wire clients
//!
//! Byte-level access to remote package repositories.
//!
//! ## Layer 1 - Transport
//!
//! Focus: reading whole files from SMB shares and HTTP repositories.
//!
//! ## Key Components
//!
//! - `Smb2Client`: SMB 2.x over Direct TCP with NTLMv2 authentication
//! - `ShareSession`: per-server session with one-shot connect and per-share mounts
//! - `HttpRepository`: `GET`-based reads for CI repositories served over HTTP

mod error;
pub mod fakes;
pub mod http;
pub mod share;
pub mod smb;

pub use error::TransportError;
pub use http::HttpRepository;
pub use share::{ConnectionState, RemoteFile, ShareIndex, ShareSession, SharedFolder, UncPath};
pub use smb::{FileId, NtStatus, Smb2Client, SmbClient, TreeId, MAX_READ_SIZE};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
