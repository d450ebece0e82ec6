use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::smb::ntlm::{self, AuthInput};
use crate::smb::wire::{self, Command, Header};
use crate::smb::{FileId, NtStatus, SmbClient, TreeId, MAX_READ_SIZE};
use crate::Result;

/// SMB over TCP, without NetBIOS.
pub const DIRECT_TCP_PORT: u16 = 445;

/// SMB2 client over a Direct TCP connection.
pub struct Smb2Client {
    port: u16,
    server: Option<String>,
    stream: Option<TcpStream>,
    message_id: u64,
    session_id: u64,
    dialect: u16,
    max_read_size: u32,
    signing_required: bool,
    signing_key: Option<[u8; 16]>,
}

impl Smb2Client {
    pub fn new() -> Self {
        Self::with_port(DIRECT_TCP_PORT)
    }

    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            server: None,
            stream: None,
            message_id: 0,
            session_id: 0,
            dialect: 0,
            max_read_size: MAX_READ_SIZE,
            signing_required: false,
            signing_key: None,
        }
    }

    fn reset(&mut self) {
        self.server = None;
        self.stream = None;
        self.message_id = 0;
        self.session_id = 0;
        self.dialect = 0;
        self.max_read_size = MAX_READ_SIZE;
        self.signing_required = false;
        self.signing_key = None;
    }

    /// Send one request and wait for its final response. Returns the header
    /// and the whole response message.
    async fn exchange(
        &mut self,
        command: Command,
        tree_id: u32,
        body: &[u8],
    ) -> Result<(Header, Vec<u8>)> {
        let message_id = self.message_id;
        self.message_id += 1;

        let mut header = Header::request(command, message_id, tree_id, self.session_id);
        if self.dialect >= wire::DIALECT_210 {
            header.credit_charge = 1;
        }
        if self.signing_key.is_some() {
            header.flags |= wire::FLAG_SIGNED;
        }

        let mut msg = Vec::with_capacity(wire::HEADER_LEN + body.len());
        header.encode(&mut msg);
        msg.extend_from_slice(body);
        if let Some(key) = &self.signing_key {
            let signature = sign(key, &msg)?;
            wire::set_signature(&mut msg, &signature);
        }

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Protocol("not connected".to_string()))?;
        stream.write_all(&wire::frame(&msg)?).await?;
        trace!(command = command.name(), message_id, "smb request sent");

        loop {
            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).await?;
            let mut reply = vec![0u8; wire::frame_len(prefix)];
            stream.read_exact(&mut reply).await?;

            let reply_header = Header::decode(&reply)?;
            if reply_header.status == NtStatus::PENDING && reply_header.flags & wire::FLAG_ASYNC != 0 {
                continue;
            }
            if reply_header.message_id != message_id {
                return Err(TransportError::Protocol(format!(
                    "{} reply has message id {}, expected {}",
                    command.name(),
                    reply_header.message_id,
                    message_id
                )));
            }
            return Ok((reply_header, reply));
        }
    }

    /// Like [`Smb2Client::exchange`], but non-success is an error.
    async fn request(
        &mut self,
        command: Command,
        tree_id: u32,
        body: &[u8],
    ) -> Result<(Header, Vec<u8>)> {
        let (header, msg) = self.exchange(command, tree_id, body).await?;
        if !header.status.is_success() {
            return Err(TransportError::Status {
                command: command.name(),
                status: header.status,
            });
        }
        Ok((header, msg))
    }
}

impl Default for Smb2Client {
    fn default() -> Self {
        Self::new()
    }
}

fn sign(key: &[u8; 16], msg: &[u8]) -> Result<[u8; 16]> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|e| TransportError::Authentication(e.to_string()))?;
    mac.update(msg);
    let digest = mac.finalize().into_bytes();
    let mut signature = [0u8; 16];
    signature.copy_from_slice(&digest[..16]);
    Ok(signature)
}

#[async_trait]
impl SmbClient for Smb2Client {
    async fn connect(&mut self, server: &str) -> Result<()> {
        self.reset();
        let stream = TcpStream::connect((server, self.port)).await?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.server = Some(server.to_string());

        let body = wire::negotiate_request(*uuid::Uuid::new_v4().as_bytes());
        let (_, msg) = self.request(Command::Negotiate, 0, &body).await?;
        let negotiated = wire::parse_negotiate_response(&msg)?;
        if negotiated.dialect != wire::DIALECT_202 && negotiated.dialect != wire::DIALECT_210 {
            return Err(TransportError::Protocol(format!(
                "server selected unsupported dialect 0x{:04x}",
                negotiated.dialect
            )));
        }
        self.dialect = negotiated.dialect;
        self.max_read_size = negotiated.max_read_size.clamp(1, MAX_READ_SIZE);
        self.signing_required = negotiated.security_mode & wire::SECURITY_SIGNING_REQUIRED != 0;
        debug!(
            server,
            dialect = format_args!("0x{:04x}", self.dialect),
            max_read_size = self.max_read_size,
            signing_required = self.signing_required,
            "smb negotiated"
        );
        Ok(())
    }

    async fn login(&mut self, domain: Option<&str>, username: &str, password: &str) -> Result<()> {
        let init = ntlm::spnego_init(&ntlm::negotiate_message());
        let (header, msg) = self
            .exchange(Command::SessionSetup, 0, &wire::session_setup_request(&init))
            .await?;
        if header.status != NtStatus::MORE_PROCESSING_REQUIRED {
            return Err(TransportError::Status {
                command: Command::SessionSetup.name(),
                status: header.status,
            });
        }
        self.session_id = header.session_id;

        let challenge = ntlm::parse_challenge(&wire::parse_session_setup_response(&msg)?)?;
        let mut client_challenge = [0u8; 8];
        client_challenge.copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..8]);
        let input = AuthInput {
            domain: domain.unwrap_or_default(),
            username,
            password,
            client_challenge,
            now: ntlm::filetime_now(),
        };
        let (auth, session_key) = ntlm::authenticate_message(&challenge, &input)?;
        let token = ntlm::spnego_response(&auth);
        self.request(Command::SessionSetup, 0, &wire::session_setup_request(&token))
            .await?;

        if self.signing_required {
            self.signing_key = Some(session_key);
        }
        debug!(session_id = self.session_id, "smb session established");
        Ok(())
    }

    async fn tree_connect(&mut self, share: &str) -> Result<TreeId> {
        let server = self
            .server
            .clone()
            .ok_or_else(|| TransportError::Protocol("not connected".to_string()))?;
        let unc = format!(r"\\{}\{}", server, share);
        let (header, _) = self
            .request(Command::TreeConnect, 0, &wire::tree_connect_request(&unc))
            .await?;
        Ok(TreeId(header.tree_id))
    }

    async fn open_file(&mut self, tree: TreeId, path: &str) -> Result<FileId> {
        let (_, msg) = self
            .request(Command::Create, tree.0, &wire::create_request(path))
            .await?;
        wire::parse_create_response(&msg)
    }

    async fn read_file(
        &mut self,
        tree: TreeId,
        file: FileId,
        offset: u64,
        length: u32,
    ) -> Result<Vec<u8>> {
        let length = length.min(self.max_read_size);
        let (_, msg) = self
            .request(Command::Read, tree.0, &wire::read_request(file, offset, length))
            .await?;
        wire::parse_read_response(&msg)
    }

    async fn close_file(&mut self, tree: TreeId, file: FileId) -> Result<()> {
        self.request(Command::Close, tree.0, &wire::close_request(file))
            .await?;
        Ok(())
    }

    fn max_read_size(&self) -> u32 {
        self.max_read_size
    }

    async fn disconnect(&mut self) {
        if self.stream.is_some() && self.session_id != 0 {
            if let Err(e) = self.exchange(Command::Logoff, 0, &wire::logoff_request()).await {
                debug!(error = %e, "smb logoff failed");
            }
        }
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.reset();
    }
}
