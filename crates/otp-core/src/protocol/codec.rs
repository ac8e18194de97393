//! Fixed-layout codec for otpd request and reply frames.
//!
//! Wire format (native C struct layout, LP64, native endianness):
//! ```text
//! request (168 bytes)
//!   [version:i32 @0][username:32 @4][challenge:17 @36][pad:3]
//!   [credential_tag:i32 @56][pad:4]
//!   union @64 {
//!     pap:  [passcode:48 @64]
//!     chap: [challenge:16 @64][clen:u64 @80][response:50 @88][pad:6][rlen:u64 @144]
//!   }
//!   [allow_sync:i32 @152][allow_async:i32 @156][challenge_delay:i32 @160][resync:i32 @164]
//!
//! reply (56 bytes)
//!   [version:i32 @0][rc:i32 @4][passcode:48 @8]
//! ```
//! Text fields are NUL-terminated and the last byte of every text field is
//! always NUL.  Padding and unused union bytes are zero.
//!
//! There is no length prefix and no request identifier.  Both ends know the
//! frame sizes, so stream ordering alone delimits messages, provided only one
//! request is ever in flight on a connection.

use thiserror::Error;
use zeroize::Zeroizing;

use crate::protocol::messages::{
    ChapExchange, Credential, CredentialTag, Passcode, StatusCode, VerificationReply,
    VerificationRequest, VerifyPolicy, CHAP_CHALLENGE_CAPACITY, CHAP_RESPONSE_CAPACITY,
    MAX_CHALLENGE_LEN, MAX_PASSCODE_LEN, MAX_USERNAME_LEN, REPLY_FRAME_SIZE, REPLY_VERSION,
    REQUEST_FRAME_SIZE, REQUEST_VERSION,
};

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than one frame.
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The frame's version tag does not match this protocol revision.
    #[error("unsupported version: expected {expected}, found {found}")]
    UnsupportedVersion { expected: i32, found: i32 },

    /// A text field has no terminator in its last byte.
    #[error("{0} field is not NUL-terminated within its capacity")]
    Unterminated(&'static str),

    /// The credential tag is not one of the assigned values.
    #[error("unknown credential tag: {0}")]
    UnknownCredentialTag(i32),

    /// The reply's status code is outside the daemon's vocabulary.
    #[error("unknown status code: {0}")]
    UnknownStatus(i32),

    /// A field value is out of range or not valid UTF-8.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Field offsets ─────────────────────────────────────────────────────────────

const REQ_VERSION: usize = 0;
const REQ_USERNAME: usize = 4;
const REQ_CHALLENGE: usize = 36;
const REQ_TAG: usize = 56;
const REQ_PAP_PASSCODE: usize = 64;
const REQ_CHAP_CHALLENGE: usize = 64;
const REQ_CHAP_CLEN: usize = 80;
const REQ_CHAP_RESPONSE: usize = 88;
const REQ_CHAP_RLEN: usize = 144;
const REQ_ALLOW_SYNC: usize = 152;
const REQ_ALLOW_ASYNC: usize = 156;
const REQ_CHALLENGE_DELAY: usize = 160;
const REQ_RESYNC: usize = 164;

const REP_VERSION: usize = 0;
const REP_RC: usize = 4;
const REP_PASSCODE: usize = 8;

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a request into one full frame.
///
/// Encoding cannot fail: [`VerificationRequest`] only holds values that fit.
/// The returned buffer is wiped on drop because it carries the credential.
///
/// # Examples
///
/// ```rust
/// use otp_core::protocol::messages::{Credential, VerificationRequest, VerifyPolicy, REQUEST_FRAME_SIZE};
/// use otp_core::{decode_request, encode_request};
///
/// let request = VerificationRequest::new(
///     "alice",
///     "",
///     Credential::pap("1234567").unwrap(),
///     VerifyPolicy::default(),
/// )
/// .unwrap();
/// let frame = encode_request(&request);
/// assert_eq!(frame.len(), REQUEST_FRAME_SIZE);
/// assert_eq!(decode_request(&frame).unwrap(), request);
/// ```
pub fn encode_request(request: &VerificationRequest) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(vec![0u8; REQUEST_FRAME_SIZE]);

    write_i32(&mut buf, REQ_VERSION, request.version());
    write_text(&mut buf, REQ_USERNAME, request.username());
    write_text(&mut buf, REQ_CHALLENGE, request.challenge());

    let credential = request.credential();
    write_i32(&mut buf, REQ_TAG, credential.tag() as i32);
    match credential {
        Credential::None => {} // union stays zeroed
        Credential::Pap(passcode) => write_text(&mut buf, REQ_PAP_PASSCODE, passcode.expose()),
        Credential::Chap(exchange) | Credential::MsChap(exchange) | Credential::MsChap2(exchange) => {
            encode_chap(&mut buf, exchange)
        }
    }

    let policy = request.policy();
    write_i32(&mut buf, REQ_ALLOW_SYNC, i32::from(policy.allow_sync));
    write_i32(&mut buf, REQ_ALLOW_ASYNC, i32::from(policy.allow_async));
    write_i32(&mut buf, REQ_CHALLENGE_DELAY, policy.challenge_delay);
    write_i32(&mut buf, REQ_RESYNC, i32::from(policy.resync));

    buf
}

/// Decodes one request frame from the beginning of `bytes`.
///
/// This is the daemon's side of the exchange; the client uses it only in
/// tests and diagnostics.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is short, carries the wrong
/// version, or has an unterminated or out-of-range field.
pub fn decode_request(bytes: &[u8]) -> Result<VerificationRequest, ProtocolError> {
    require_len(bytes, REQUEST_FRAME_SIZE)?;

    let version = read_i32(bytes, REQ_VERSION);
    if version != REQUEST_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            expected: REQUEST_VERSION,
            found: version,
        });
    }

    let username = read_text(bytes, REQ_USERNAME, MAX_USERNAME_LEN + 1, "username")?;
    let challenge = read_text(bytes, REQ_CHALLENGE, MAX_CHALLENGE_LEN + 1, "challenge")?;

    let raw_tag = read_i32(bytes, REQ_TAG);
    let tag = CredentialTag::try_from(raw_tag)
        .map_err(|_| ProtocolError::UnknownCredentialTag(raw_tag))?;
    let credential = match tag {
        CredentialTag::None => Credential::None,
        CredentialTag::Pap => {
            let text = Zeroizing::new(read_text(
                bytes,
                REQ_PAP_PASSCODE,
                MAX_PASSCODE_LEN + 1,
                "passcode",
            )?);
            Credential::Pap(to_passcode(&text)?)
        }
        CredentialTag::Chap => Credential::Chap(decode_chap(bytes)?),
        CredentialTag::MsChap => Credential::MsChap(decode_chap(bytes)?),
        CredentialTag::MsChap2 => Credential::MsChap2(decode_chap(bytes)?),
    };

    let policy = VerifyPolicy {
        allow_sync: read_i32(bytes, REQ_ALLOW_SYNC) != 0,
        allow_async: read_i32(bytes, REQ_ALLOW_ASYNC) != 0,
        challenge_delay: read_i32(bytes, REQ_CHALLENGE_DELAY),
        resync: read_i32(bytes, REQ_RESYNC) != 0,
    };

    VerificationRequest::new(username, challenge, credential, policy)
        .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}

/// Encodes a reply into one full frame.
///
/// Used by daemons and test doubles.  The buffer is wiped on drop because it
/// carries the cleared passcode.
pub fn encode_reply(reply: &VerificationReply) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(vec![0u8; REPLY_FRAME_SIZE]);
    write_i32(&mut buf, REP_VERSION, reply.version());
    write_i32(&mut buf, REP_RC, reply.status as i32);
    write_text(&mut buf, REP_PASSCODE, reply.passcode.expose());
    buf
}

/// Decodes and validates one reply frame from the beginning of `bytes`.
///
/// The version must equal [`REPLY_VERSION`] and the passcode field must end
/// in a terminator.  Either violation means the daemon speaks a different
/// revision of the protocol, not that the credential was bad.
///
/// The passcode is only meaningful on [`StatusCode::Ok`].  For any other
/// status its contents are ignored and the returned passcode is empty.
///
/// # Errors
///
/// Returns [`ProtocolError`] on any validation failure.
pub fn decode_reply(bytes: &[u8]) -> Result<VerificationReply, ProtocolError> {
    require_len(bytes, REPLY_FRAME_SIZE)?;

    let version = read_i32(bytes, REP_VERSION);
    if version != REPLY_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            expected: REPLY_VERSION,
            found: version,
        });
    }

    check_terminated(bytes, REP_PASSCODE, MAX_PASSCODE_LEN + 1, "passcode")?;

    let rc = read_i32(bytes, REP_RC);
    let status = StatusCode::try_from(rc).map_err(|_| ProtocolError::UnknownStatus(rc))?;

    let passcode = if status == StatusCode::Ok {
        let text = Zeroizing::new(read_text(
            bytes,
            REP_PASSCODE,
            MAX_PASSCODE_LEN + 1,
            "passcode",
        )?);
        to_passcode(&text)?
    } else {
        Passcode::default()
    };

    Ok(VerificationReply { status, passcode })
}

// ── CHAP-family union member ──────────────────────────────────────────────────

fn encode_chap(buf: &mut [u8], exchange: &ChapExchange) {
    let challenge = exchange.challenge();
    let response = exchange.response();
    buf[REQ_CHAP_CHALLENGE..REQ_CHAP_CHALLENGE + challenge.len()].copy_from_slice(challenge);
    buf[REQ_CHAP_CLEN..REQ_CHAP_CLEN + 8].copy_from_slice(&(challenge.len() as u64).to_ne_bytes());
    buf[REQ_CHAP_RESPONSE..REQ_CHAP_RESPONSE + response.len()].copy_from_slice(response);
    buf[REQ_CHAP_RLEN..REQ_CHAP_RLEN + 8].copy_from_slice(&(response.len() as u64).to_ne_bytes());
}

fn decode_chap(bytes: &[u8]) -> Result<ChapExchange, ProtocolError> {
    let clen = read_u64(bytes, REQ_CHAP_CLEN);
    if clen > CHAP_CHALLENGE_CAPACITY as u64 {
        return Err(ProtocolError::MalformedPayload(format!(
            "challenge length {clen} exceeds {CHAP_CHALLENGE_CAPACITY}"
        )));
    }
    let rlen = read_u64(bytes, REQ_CHAP_RLEN);
    if rlen > CHAP_RESPONSE_CAPACITY as u64 {
        return Err(ProtocolError::MalformedPayload(format!(
            "response length {rlen} exceeds {CHAP_RESPONSE_CAPACITY}"
        )));
    }
    let challenge = &bytes[REQ_CHAP_CHALLENGE..REQ_CHAP_CHALLENGE + clen as usize];
    let response = &bytes[REQ_CHAP_RESPONSE..REQ_CHAP_RESPONSE + rlen as usize];
    Ok(ChapExchange::from_wire(challenge, response))
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        return Err(ProtocolError::InsufficientData {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

/// Copies `text` into the field at `offset`; the bytes after it, including
/// the field's last byte, are left as zero.
fn write_text(buf: &mut [u8], offset: usize, text: &str) {
    let bytes = text.as_bytes();
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_ne_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
        buf[offset + 4],
        buf[offset + 5],
        buf[offset + 6],
        buf[offset + 7],
    ])
}

fn check_terminated(
    buf: &[u8],
    offset: usize,
    capacity: usize,
    field: &'static str,
) -> Result<(), ProtocolError> {
    if buf[offset + capacity - 1] != 0 {
        return Err(ProtocolError::Unterminated(field));
    }
    Ok(())
}

/// Reads a NUL-terminated text field of `capacity` bytes (terminator included).
fn read_text(
    buf: &[u8],
    offset: usize,
    capacity: usize,
    field: &'static str,
) -> Result<String, ProtocolError> {
    check_terminated(buf, offset, capacity, field)?;
    let raw = &buf[offset..offset + capacity];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(capacity - 1);
    String::from_utf8(raw[..end].to_vec())
        .map_err(|e| ProtocolError::MalformedPayload(format!("{field} is not valid UTF-8: {e}")))
}

fn to_passcode(text: &str) -> Result<Passcode, ProtocolError> {
    Passcode::new(text).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
