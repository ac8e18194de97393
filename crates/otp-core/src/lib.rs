//! # otp-core
//!
//! Shared library for the otpd verification client containing the
//! fixed-frame wire protocol, the credential types handed to the daemon, and
//! the mapping from daemon status codes to authorization verdicts.
//!
//! This crate has zero dependencies on sockets or OS APIs, so the same codec
//! serves the client, test daemons, and anything that needs to inspect a
//! frame.
//!
//! # Architecture overview (for beginners)
//!
//! A network access server (RADIUS, for example) receives a one-time
//! password from a user.  It does not check the password itself.  Instead it
//! asks a separate trusted process, *otpd*, over a local stream socket.  The
//! two processes exchange exactly one request frame and one reply frame per
//! verification.
//!
//! - **`protocol`** – How bytes travel over the socket.  Frames are
//!   fixed-size C-style records with no length prefix and no request
//!   identifier; both sides agree on the exact layout out of band.
//!
//! - **`verdict`** – What the caller does with the daemon's answer: accept,
//!   reject, lock the user out, or fail closed.

pub mod protocol;
pub mod verdict;

// Re-export the most-used types at the crate root so callers can write
// `otp_core::VerificationRequest` instead of the full module path.
pub use protocol::codec::{
    decode_reply, decode_request, encode_reply, encode_request, ProtocolError,
};
pub use protocol::messages::{
    ChapExchange, Credential, CredentialTag, InputError, Passcode, StatusCode, VerificationReply,
    VerificationRequest, VerifyPolicy,
};
pub use verdict::Verdict;
