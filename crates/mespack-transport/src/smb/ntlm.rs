//! NTLMv2 authentication wrapped in SPNEGO
//!
//! Only the client side of the three-message exchange is implemented:
//! NEGOTIATE out, CHALLENGE in, AUTHENTICATE out. No key exchange, so the
//! session base key doubles as the signing key.

use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;

use crate::error::TransportError;
use crate::smb::wire::{put_u16, put_u32, slice_at, u16_at, u32_at, utf16le};
use crate::Result;

type HmacMd5 = Hmac<Md5>;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_SIGN: u32 = 0x0000_0010;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const CLIENT_FLAGS: u32 = NEGOTIATE_UNICODE
    | REQUEST_TARGET
    | NEGOTIATE_SIGN
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_TARGET_INFO
    | NEGOTIATE_128
    | NEGOTIATE_56;

const AV_EOL: u16 = 0;
const AV_TIMESTAMP: u16 = 7;

/// Seconds between 1601-01-01 and the Unix epoch.
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;

const OID_SPNEGO: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x02];
const OID_NTLMSSP: &[u8] = &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x02, 0x0a];

/// Server CHALLENGE message fields the client needs.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

/// Client NEGOTIATE message.
pub fn negotiate_message() -> Vec<u8> {
    let mut m = Vec::with_capacity(32);
    m.extend_from_slice(SIGNATURE);
    put_u32(&mut m, 1);
    put_u32(&mut m, CLIENT_FLAGS);
    m.extend_from_slice(&[0u8; 16]); // domain and workstation fields
    m
}

/// Parse a CHALLENGE message, accepting it bare or inside a SPNEGO token.
pub fn parse_challenge(blob: &[u8]) -> Result<Challenge> {
    let msg = find_ntlmssp(blob)
        .ok_or_else(|| TransportError::Authentication("no NTLMSSP token in reply".to_string()))?;
    if u32_at(msg, 8)? != 2 {
        return Err(TransportError::Authentication(
            "expected NTLM CHALLENGE message".to_string(),
        ));
    }
    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(slice_at(msg, 24, 8)?);
    let info_len = u16_at(msg, 40)? as usize;
    let info_offset = u32_at(msg, 44)? as usize;
    Ok(Challenge {
        flags: u32_at(msg, 20)?,
        server_challenge,
        target_info: slice_at(msg, info_offset, info_len)?.to_vec(),
    })
}

/// Credentials and nonces that go into an AUTHENTICATE message.
pub struct AuthInput<'a> {
    pub domain: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub client_challenge: [u8; 8],
    /// FILETIME used when the server sent none
    pub now: u64,
}

/// Build the AUTHENTICATE message. Returns it with the session key.
pub fn authenticate_message(challenge: &Challenge, input: &AuthInput<'_>) -> Result<(Vec<u8>, [u8; 16])> {
    let key = ntowf_v2(input.password, input.username, input.domain)?;
    let timestamp = find_timestamp(&challenge.target_info).unwrap_or(input.now);

    let mut temp = Vec::with_capacity(28 + challenge.target_info.len() + 4);
    temp.extend_from_slice(&[0x01, 0x01, 0, 0, 0, 0, 0, 0]);
    temp.extend_from_slice(&timestamp.to_le_bytes());
    temp.extend_from_slice(&input.client_challenge);
    temp.extend_from_slice(&[0u8; 4]);
    temp.extend_from_slice(&challenge.target_info);
    temp.extend_from_slice(&[0u8; 4]);

    let mut proof_input = challenge.server_challenge.to_vec();
    proof_input.extend_from_slice(&temp);
    let nt_proof = hmac_md5(&key, &proof_input)?;
    let session_key = hmac_md5(&key, &nt_proof)?;

    let mut nt_response = nt_proof.to_vec();
    nt_response.extend_from_slice(&temp);

    let lm_response = [0u8; 24];
    let domain = utf16le(input.domain);
    let user = utf16le(input.username);
    let workstation: Vec<u8> = Vec::new();
    let flags = (challenge.flags & CLIENT_FLAGS) | NEGOTIATE_UNICODE;

    let fields: [&[u8]; 6] = [&lm_response, &nt_response, &domain, &user, &workstation, &[]];
    let mut m = Vec::with_capacity(64 + fields.iter().map(|f| f.len()).sum::<usize>());
    m.extend_from_slice(SIGNATURE);
    put_u32(&mut m, 3);
    let mut offset = 64u32;
    for field in fields {
        put_u16(&mut m, field.len() as u16);
        put_u16(&mut m, field.len() as u16);
        put_u32(&mut m, offset);
        offset += field.len() as u32;
    }
    put_u32(&mut m, flags);
    for field in fields {
        m.extend_from_slice(field);
    }
    Ok((m, session_key))
}

/// NTOWFv2: HMAC-MD5 keyed by the MD4 of the password over user and domain.
fn ntowf_v2(password: &str, username: &str, domain: &str) -> Result<[u8; 16]> {
    let nt_hash = Md4::digest(utf16le(password));
    let identity = utf16le(&format!("{}{}", username.to_uppercase(), domain));
    hmac_md5(&nt_hash, &identity)
}

fn hmac_md5(key: &[u8], data: &[u8]) -> Result<[u8; 16]> {
    let mut mac = <HmacMd5 as Mac>::new_from_slice(key)
        .map_err(|e| TransportError::Authentication(e.to_string()))?;
    mac.update(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn find_timestamp(target_info: &[u8]) -> Option<u64> {
    let mut at = 0;
    while at + 4 <= target_info.len() {
        let id = u16_at(target_info, at).ok()?;
        let len = u16_at(target_info, at + 2).ok()? as usize;
        if id == AV_EOL {
            return None;
        }
        if id == AV_TIMESTAMP && len == 8 {
            let raw = slice_at(target_info, at + 4, 8).ok()?;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(raw);
            return Some(u64::from_le_bytes(bytes));
        }
        at += 4 + len;
    }
    None
}

/// Current time as a Windows FILETIME.
pub fn filetime_now() -> u64 {
    let now = chrono::Utc::now();
    let secs = (now.timestamp() + FILETIME_EPOCH_OFFSET).max(0) as u64;
    secs * 10_000_000 + u64::from(now.timestamp_subsec_nanos() / 100)
}

fn find_ntlmssp(blob: &[u8]) -> Option<&[u8]> {
    blob.windows(SIGNATURE.len())
        .position(|w| w == SIGNATURE)
        .map(|at| &blob[at..])
}

// ---------------------------------------------------------------------------
// SPNEGO
// ---------------------------------------------------------------------------

/// NegTokenInit offering NTLMSSP with `token` as the mech token.
pub fn spnego_init(token: &[u8]) -> Vec<u8> {
    let mech_types = der(0x30, &der(0x06, OID_NTLMSSP));
    let mut init = der(0xa0, &mech_types);
    init.extend(der(0xa2, &der(0x04, token)));
    let neg_token_init = der(0xa0, &der(0x30, &init));

    let mut inner = der(0x06, OID_SPNEGO);
    inner.extend(neg_token_init);
    der(0x60, &inner)
}

/// NegTokenResp carrying `token` as the response token.
pub fn spnego_response(token: &[u8]) -> Vec<u8> {
    let response = der(0xa2, &der(0x04, token));
    der(0xa1, &der(0x30, &response))
}

fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = content.len();
    let mut out = Vec::with_capacity(len + 4);
    out.push(tag);
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}
