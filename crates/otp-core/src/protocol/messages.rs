//! Request and reply records exchanged with otpd.
//!
//! Every text field has a fixed capacity on the wire.  The constructors in
//! this module enforce those capacities up front, so a value that exists is
//! always encodable and the codec never has to truncate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Version tag carried by every request frame.
pub const REQUEST_VERSION: i32 = 2;

/// Version tag the daemon must put in every reply frame.
pub const REPLY_VERSION: i32 = 1;

/// Longest username the daemon accepts, excluding the terminator.
pub const MAX_USERNAME_LEN: usize = 31;

/// Longest challenge text the daemon accepts, excluding the terminator.
pub const MAX_CHALLENGE_LEN: usize = 16;

/// Longest passcode (PIN included) the daemon accepts, excluding the terminator.
pub const MAX_PASSCODE_LEN: usize = 47;

/// Capacity of the CHAP-family challenge buffer.
pub const CHAP_CHALLENGE_CAPACITY: usize = 16;

/// Capacity of the CHAP-family response buffer.
pub const CHAP_RESPONSE_CAPACITY: usize = 50;

/// Total size of an encoded request frame in bytes.
pub const REQUEST_FRAME_SIZE: usize = 168;

/// Total size of an encoded reply frame in bytes.
pub const REPLY_FRAME_SIZE: usize = 56;

// ── Input validation ──────────────────────────────────────────────────────────

/// A caller-supplied value that cannot be represented in a request frame.
///
/// These are detected before any I/O happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    /// A text field is longer than its fixed capacity.
    #[error("{field} too long: {len} bytes exceeds the {max}-byte limit")]
    TooLong {
        field: &'static str,
        max: usize,
        len: usize,
    },

    /// A text field contains a NUL byte, which would end it early on the wire.
    #[error("{field} contains an embedded NUL byte")]
    EmbeddedNul { field: &'static str },

    /// A CHAP-family challenge or response has a size the method does not allow.
    #[error("{method} {field} wrong size: {len} bytes")]
    WrongSize {
        method: CredentialTag,
        field: &'static str,
        len: usize,
    },
}

impl InputError {
    /// Returns `true` for a malformed challenge/response pair, as opposed to
    /// an over-long text field.
    pub fn is_malformed_credential(&self) -> bool {
        matches!(self, InputError::WrongSize { .. })
    }
}

fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), InputError> {
    if value.as_bytes().contains(&0) {
        return Err(InputError::EmbeddedNul { field });
    }
    if value.len() > max {
        return Err(InputError::TooLong {
            field,
            max,
            len: value.len(),
        });
    }
    Ok(())
}

// ── Credential tags ───────────────────────────────────────────────────────────

/// Selects which member of the request's credential union is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CredentialTag {
    None = 0,
    Pap = 1,
    Chap = 3,
    MsChap = 5,
    MsChap2 = 7,
}

impl TryFrom<i32> for CredentialTag {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CredentialTag::None),
            1 => Ok(CredentialTag::Pap),
            3 => Ok(CredentialTag::Chap),
            5 => Ok(CredentialTag::MsChap),
            7 => Ok(CredentialTag::MsChap2),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CredentialTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialTag::None => "none",
            CredentialTag::Pap => "PAP",
            CredentialTag::Chap => "CHAP",
            CredentialTag::MsChap => "MS-CHAP",
            CredentialTag::MsChap2 => "MS-CHAP2",
        })
    }
}

// ── Status codes ──────────────────────────────────────────────────────────────

/// Result code returned by the daemon in a reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    UserUnknown = 1,
    AuthInfoUnavailable = 2,
    AuthError = 3,
    MaxTriesExceeded = 4,
    ServiceError = 5,
    NextPasscodeRequired = 6,
    InvalidPin = 7,
}

impl TryFrom<i32> for StatusCode {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::UserUnknown),
            2 => Ok(StatusCode::AuthInfoUnavailable),
            3 => Ok(StatusCode::AuthError),
            4 => Ok(StatusCode::MaxTriesExceeded),
            5 => Ok(StatusCode::ServiceError),
            6 => Ok(StatusCode::NextPasscodeRequired),
            7 => Ok(StatusCode::InvalidPin),
            _ => Err(()),
        }
    }
}

// ── Passcode ──────────────────────────────────────────────────────────────────

/// A passcode of at most [`MAX_PASSCODE_LEN`] bytes.
///
/// The buffer is wiped when dropped and never printed by `Debug`.  The value
/// usually contains the user's PIN, so it must not reach a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct Passcode(Zeroizing<String>);

impl Passcode {
    /// Validates and wraps a passcode.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if the value is too long or contains a NUL byte.
    pub fn new(value: impl Into<String>) -> Result<Self, InputError> {
        let value = Zeroizing::new(value.into());
        check_text("passcode", &value, MAX_PASSCODE_LEN)?;
        Ok(Self(value))
    }

    /// Returns the cleartext passcode.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Passcode {
    fn default() -> Self {
        Self(Zeroizing::new(String::new()))
    }
}

impl fmt::Debug for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passcode(<redacted>)")
    }
}

// ── Credentials ───────────────────────────────────────────────────────────────

/// Challenge/response pair shared by CHAP, MS-CHAP and MS-CHAP2.
#[derive(Clone, PartialEq, Eq)]
pub struct ChapExchange {
    challenge: Zeroizing<Vec<u8>>,
    response: Zeroizing<Vec<u8>>,
}

impl ChapExchange {
    /// Applies the per-method size rules.
    fn for_method(
        method: CredentialTag,
        challenge: &[u8],
        response: &[u8],
    ) -> Result<Self, InputError> {
        let challenge_ok = match method {
            CredentialTag::Chap => challenge.len() <= CHAP_CHALLENGE_CAPACITY,
            CredentialTag::MsChap => challenge.len() == 8,
            _ => challenge.len() == CHAP_CHALLENGE_CAPACITY,
        };
        if !challenge_ok {
            return Err(InputError::WrongSize {
                method,
                field: "challenge",
                len: challenge.len(),
            });
        }

        let expected_response = match method {
            CredentialTag::Chap => 17,
            _ => CHAP_RESPONSE_CAPACITY,
        };
        if response.len() != expected_response {
            return Err(InputError::WrongSize {
                method,
                field: "response",
                len: response.len(),
            });
        }

        Ok(Self::from_wire(challenge, response))
    }

    /// Wraps bytes already known to fit the wire buffers.
    pub(crate) fn from_wire(challenge: &[u8], response: &[u8]) -> Self {
        Self {
            challenge: Zeroizing::new(challenge.to_vec()),
            response: Zeroizing::new(response.to_vec()),
        }
    }

    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    pub fn response(&self) -> &[u8] {
        &self.response
    }
}

/// The credential variant being tested, with its payload.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// No usable credential.  Never sent over the wire.
    None,
    Pap(Passcode),
    Chap(ChapExchange),
    MsChap(ChapExchange),
    MsChap2(ChapExchange),
}

impl Credential {
    /// Builds a PAP credential.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if the passcode does not fit its field.
    pub fn pap(passcode: &str) -> Result<Self, InputError> {
        Passcode::new(passcode).map(Credential::Pap)
    }

    /// Builds a CHAP credential: challenge up to 16 bytes, response exactly 17.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::WrongSize`] if either part has the wrong size.
    pub fn chap(challenge: &[u8], response: &[u8]) -> Result<Self, InputError> {
        ChapExchange::for_method(CredentialTag::Chap, challenge, response).map(Credential::Chap)
    }

    /// Builds an MS-CHAP credential: challenge exactly 8 bytes, response exactly 50.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::WrongSize`] if either part has the wrong size.
    pub fn ms_chap(challenge: &[u8], response: &[u8]) -> Result<Self, InputError> {
        ChapExchange::for_method(CredentialTag::MsChap, challenge, response)
            .map(Credential::MsChap)
    }

    /// Builds an MS-CHAP2 credential: challenge exactly 16 bytes, response exactly 50.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::WrongSize`] if either part has the wrong size.
    pub fn ms_chap2(challenge: &[u8], response: &[u8]) -> Result<Self, InputError> {
        ChapExchange::for_method(CredentialTag::MsChap2, challenge, response)
            .map(Credential::MsChap2)
    }

    pub fn tag(&self) -> CredentialTag {
        match self {
            Credential::None => CredentialTag::None,
            Credential::Pap(_) => CredentialTag::Pap,
            Credential::Chap(_) => CredentialTag::Chap,
            Credential::MsChap(_) => CredentialTag::MsChap,
            Credential::MsChap2(_) => CredentialTag::MsChap2,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.tag())
    }
}

// ── Request / reply ───────────────────────────────────────────────────────────

/// Verification policy flags copied into every request.
///
/// Deserializes from a table naming any subset of its fields; the rest
/// take their [`Default`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyPolicy {
    /// Whether synchronous (event/time based) responses may be accepted.
    pub allow_sync: bool,
    /// Whether asynchronous (challenge/response) mode may be used.
    pub allow_async: bool,
    /// Seconds the daemon waits between challenges for the same user.
    pub challenge_delay: i32,
    /// Whether the daemon may resynchronise the token on success.
    pub resync: bool,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            allow_sync: true,
            allow_async: false,
            challenge_delay: 30,
            resync: true,
        }
    }
}

/// One verification request, built fresh for each attempt.
///
/// Holds the raw credential, so it is not `Debug`-printed beyond the
/// username and the credential kind.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    username: String,
    challenge: String,
    credential: Credential,
    policy: VerifyPolicy,
}

impl VerificationRequest {
    /// Checks the username and challenge against their field capacities
    /// without building a request.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if either is too long or contains a NUL byte.
    pub fn check_identity(username: &str, challenge: &str) -> Result<(), InputError> {
        check_text("username", username, MAX_USERNAME_LEN)?;
        check_text("challenge", challenge, MAX_CHALLENGE_LEN)
    }

    /// Validates every bounded field and builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if the username or challenge is too long or
    /// contains a NUL byte.
    pub fn new(
        username: impl Into<String>,
        challenge: impl Into<String>,
        credential: Credential,
        policy: VerifyPolicy,
    ) -> Result<Self, InputError> {
        let username = username.into();
        let challenge = challenge.into();
        Self::check_identity(&username, &challenge)?;
        Ok(Self {
            username,
            challenge,
            credential,
            policy,
        })
    }

    pub fn version(&self) -> i32 {
        REQUEST_VERSION
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn policy(&self) -> VerifyPolicy {
        self.policy
    }
}

impl fmt::Debug for VerificationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationRequest")
            .field("username", &self.username)
            .field("credential", &self.credential.tag())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// The daemon's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReply {
    pub status: StatusCode,
    /// Cleared passcode; only meaningful when `status` is [`StatusCode::Ok`].
    pub passcode: Passcode,
}

impl VerificationReply {
    pub fn version(&self) -> i32 {
        REPLY_VERSION
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
