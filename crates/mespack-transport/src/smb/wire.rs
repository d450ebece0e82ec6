//! SMB2 message layout
//!
//! Header and request/response bodies for the commands the client issues.
//! Offsets inside bodies follow MS-SMB2; buffer offsets are relative to the
//! start of the SMB2 header.

use crate::error::TransportError;
use crate::smb::{FileId, NtStatus};
use crate::Result;

pub const HEADER_LEN: usize = 64;
const PROTOCOL_ID: [u8; 4] = [0xFE, b'S', b'M', b'B'];

pub const FLAG_RESPONSE: u32 = 0x0000_0001;
pub const FLAG_ASYNC: u32 = 0x0000_0002;
pub const FLAG_SIGNED: u32 = 0x0000_0008;

pub const DIALECT_202: u16 = 0x0202;
pub const DIALECT_210: u16 = 0x0210;

pub const SECURITY_SIGNING_ENABLED: u16 = 0x0001;
pub const SECURITY_SIGNING_REQUIRED: u16 = 0x0002;

const SIGNATURE_OFFSET: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Negotiate = 0x0000,
    SessionSetup = 0x0001,
    Logoff = 0x0002,
    TreeConnect = 0x0003,
    Create = 0x0005,
    Close = 0x0006,
    Read = 0x0008,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Negotiate => "NEGOTIATE",
            Command::SessionSetup => "SESSION_SETUP",
            Command::Logoff => "LOGOFF",
            Command::TreeConnect => "TREE_CONNECT",
            Command::Create => "CREATE",
            Command::Close => "CLOSE",
            Command::Read => "READ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub credit_charge: u16,
    pub status: NtStatus,
    pub command: u16,
    pub credits: u16,
    pub flags: u32,
    pub message_id: u64,
    pub tree_id: u32,
    pub session_id: u64,
}

impl Header {
    pub fn request(command: Command, message_id: u64, tree_id: u32, session_id: u64) -> Self {
        Self {
            credit_charge: 0,
            status: NtStatus::SUCCESS,
            command: command as u16,
            credits: 8,
            flags: 0,
            message_id,
            tree_id,
            session_id,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&PROTOCOL_ID);
        put_u16(out, HEADER_LEN as u16);
        put_u16(out, self.credit_charge);
        put_u32(out, self.status.0);
        put_u16(out, self.command);
        put_u16(out, self.credits);
        put_u32(out, self.flags);
        put_u32(out, 0); // next command
        put_u64(out, self.message_id);
        put_u32(out, 0); // process id
        put_u32(out, self.tree_id);
        put_u64(out, self.session_id);
        out.extend_from_slice(&[0u8; 16]);
    }

    pub fn decode(msg: &[u8]) -> Result<Self> {
        if msg.len() < HEADER_LEN || msg[..4] != PROTOCOL_ID {
            return Err(TransportError::Protocol("not an SMB2 message".to_string()));
        }
        Ok(Self {
            credit_charge: u16_at(msg, 6)?,
            status: NtStatus(u32_at(msg, 8)?),
            command: u16_at(msg, 12)?,
            credits: u16_at(msg, 14)?,
            flags: u32_at(msg, 16)?,
            message_id: u64_at(msg, 24)?,
            tree_id: u32_at(msg, 36)?,
            session_id: u64_at(msg, 40)?,
        })
    }
}

/// Write `signature` into an encoded message.
pub fn set_signature(msg: &mut [u8], signature: &[u8; 16]) {
    msg[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 16].copy_from_slice(signature);
}

/// Direct-TCP framing: a zero byte then a 24-bit big-endian length.
pub fn frame(msg: &[u8]) -> Result<Vec<u8>> {
    let len = msg.len();
    if len > 0x00FF_FFFF {
        return Err(TransportError::Protocol(format!("message too large: {len} bytes")));
    }
    let mut out = Vec::with_capacity(len + 4);
    out.push(0);
    out.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
    out.extend_from_slice(msg);
    Ok(out)
}

/// Body length announced by a Direct-TCP frame prefix.
pub fn frame_len(prefix: [u8; 4]) -> usize {
    u32::from_be_bytes([0, prefix[1], prefix[2], prefix[3]]) as usize
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn negotiate_request(client_guid: [u8; 16]) -> Vec<u8> {
    let dialects = [DIALECT_202, DIALECT_210];
    let mut b = Vec::with_capacity(40);
    put_u16(&mut b, 36);
    put_u16(&mut b, dialects.len() as u16);
    put_u16(&mut b, SECURITY_SIGNING_ENABLED);
    put_u16(&mut b, 0);
    put_u32(&mut b, 0); // capabilities
    b.extend_from_slice(&client_guid);
    put_u64(&mut b, 0); // client start time
    for d in dialects {
        put_u16(&mut b, d);
    }
    b
}

pub fn session_setup_request(security_blob: &[u8]) -> Vec<u8> {
    let mut b = Vec::with_capacity(24 + security_blob.len());
    put_u16(&mut b, 25);
    b.push(0); // flags
    b.push(SECURITY_SIGNING_ENABLED as u8);
    put_u32(&mut b, 0); // capabilities
    put_u32(&mut b, 0); // channel
    put_u16(&mut b, (HEADER_LEN + 24) as u16);
    put_u16(&mut b, security_blob.len() as u16);
    put_u64(&mut b, 0); // previous session
    b.extend_from_slice(security_blob);
    b
}

pub fn tree_connect_request(unc: &str) -> Vec<u8> {
    let path = utf16le(unc);
    let mut b = Vec::with_capacity(8 + path.len());
    put_u16(&mut b, 9);
    put_u16(&mut b, 0);
    put_u16(&mut b, (HEADER_LEN + 8) as u16);
    put_u16(&mut b, path.len() as u16);
    b.extend_from_slice(&path);
    b
}

const FILE_READ_DATA: u32 = 0x0000_0001;
const FILE_READ_EA: u32 = 0x0000_0008;
const FILE_READ_ATTRIBUTES: u32 = 0x0000_0080;
const READ_CONTROL: u32 = 0x0002_0000;
const SYNCHRONIZE: u32 = 0x0010_0000;
const FILE_ATTRIBUTE_NORMAL: u32 = 0x0000_0080;
const FILE_SHARE_READ: u32 = 0x0000_0001;
const FILE_SHARE_WRITE: u32 = 0x0000_0002;
const FILE_OPEN: u32 = 0x0000_0001;
const FILE_NON_DIRECTORY_FILE: u32 = 0x0000_0040;
const IMPERSONATION: u32 = 0x0000_0002;

pub fn create_request(path: &str) -> Vec<u8> {
    let name = utf16le(path);
    let mut b = Vec::with_capacity(56 + name.len().max(1));
    put_u16(&mut b, 57);
    b.push(0); // security flags
    b.push(0); // oplock level: none
    put_u32(&mut b, IMPERSONATION);
    put_u64(&mut b, 0); // create flags
    put_u64(&mut b, 0); // reserved
    put_u32(
        &mut b,
        FILE_READ_DATA | FILE_READ_EA | FILE_READ_ATTRIBUTES | READ_CONTROL | SYNCHRONIZE,
    );
    put_u32(&mut b, FILE_ATTRIBUTE_NORMAL);
    put_u32(&mut b, FILE_SHARE_READ | FILE_SHARE_WRITE);
    put_u32(&mut b, FILE_OPEN);
    put_u32(&mut b, FILE_NON_DIRECTORY_FILE);
    put_u16(&mut b, (HEADER_LEN + 56) as u16);
    put_u16(&mut b, name.len() as u16);
    put_u32(&mut b, 0); // create contexts offset
    put_u32(&mut b, 0); // create contexts length
    if name.is_empty() {
        b.push(0);
    } else {
        b.extend_from_slice(&name);
    }
    b
}

pub fn read_request(file: FileId, offset: u64, length: u32) -> Vec<u8> {
    let mut b = Vec::with_capacity(49);
    put_u16(&mut b, 49);
    b.push(0x50); // padding: data right after the response body
    b.push(0); // flags
    put_u32(&mut b, length);
    put_u64(&mut b, offset);
    b.extend_from_slice(&file.0);
    put_u32(&mut b, 0); // minimum count
    put_u32(&mut b, 0); // channel
    put_u32(&mut b, 0); // remaining bytes
    put_u16(&mut b, 0); // channel info offset
    put_u16(&mut b, 0); // channel info length
    b.push(0);
    b
}

pub fn close_request(file: FileId) -> Vec<u8> {
    let mut b = Vec::with_capacity(24);
    put_u16(&mut b, 24);
    put_u16(&mut b, 0);
    put_u32(&mut b, 0);
    b.extend_from_slice(&file.0);
    b
}

pub fn logoff_request() -> Vec<u8> {
    let mut b = Vec::with_capacity(4);
    put_u16(&mut b, 4);
    put_u16(&mut b, 0);
    b
}

// ---------------------------------------------------------------------------
// Responses (`msg` is the whole message, header included)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NegotiateResponse {
    pub security_mode: u16,
    pub dialect: u16,
    pub max_read_size: u32,
    pub security_blob: Vec<u8>,
}

pub fn parse_negotiate_response(msg: &[u8]) -> Result<NegotiateResponse> {
    let body = HEADER_LEN;
    let blob_offset = u16_at(msg, body + 56)? as usize;
    let blob_len = u16_at(msg, body + 58)? as usize;
    Ok(NegotiateResponse {
        security_mode: u16_at(msg, body + 2)?,
        dialect: u16_at(msg, body + 4)?,
        max_read_size: u32_at(msg, body + 32)?,
        security_blob: slice_at(msg, blob_offset, blob_len)?.to_vec(),
    })
}

pub fn parse_session_setup_response(msg: &[u8]) -> Result<Vec<u8>> {
    let body = HEADER_LEN;
    let blob_offset = u16_at(msg, body + 4)? as usize;
    let blob_len = u16_at(msg, body + 6)? as usize;
    Ok(slice_at(msg, blob_offset, blob_len)?.to_vec())
}

pub fn parse_create_response(msg: &[u8]) -> Result<FileId> {
    let raw = slice_at(msg, HEADER_LEN + 64, 16)?;
    let mut id = [0u8; 16];
    id.copy_from_slice(raw);
    Ok(FileId(id))
}

pub fn parse_read_response(msg: &[u8]) -> Result<Vec<u8>> {
    let body = HEADER_LEN;
    let data_offset = *msg
        .get(body + 2)
        .ok_or_else(|| truncated(body + 2))? as usize;
    let data_len = u32_at(msg, body + 4)? as usize;
    if data_len == 0 {
        return Ok(Vec::new());
    }
    Ok(slice_at(msg, data_offset, data_len)?.to_vec())
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

pub fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

pub fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn truncated(at: usize) -> TransportError {
    TransportError::Protocol(format!("message truncated at offset {at}"))
}

pub fn slice_at(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    buf.get(offset..offset + len)
        .ok_or_else(|| truncated(offset + len))
}

pub fn u16_at(buf: &[u8], offset: usize) -> Result<u16> {
    let b = slice_at(buf, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub fn u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    let b = slice_at(buf, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn u64_at(buf: &[u8], offset: usize) -> Result<u64> {
    let b = slice_at(buf, offset, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Ok(u64::from_le_bytes(raw))
}
