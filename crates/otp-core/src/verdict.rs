//! Authorization verdicts derived from daemon status codes.
//!
//! The daemon answers with a [`StatusCode`]; the host server needs a smaller
//! vocabulary that says what to do with the user.  Anything that is not a
//! clean `ok` from the daemon must fail closed, so only [`Verdict::Accept`]
//! ever authorizes.

use std::fmt;

use crate::protocol::messages::StatusCode;

/// Caller-facing outcome of one verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The passcode is valid.
    Accept,
    /// The user or passcode is wrong, or the request could not be formed.
    Reject,
    /// The user must not be allowed in until an administrator or a new
    /// passcode intervenes.
    LockOut,
    /// The verification could not be completed.  Callers must fail closed.
    Fail,
    /// The challenge/response material was malformed.
    Invalid,
    /// There was no credential to test; the daemon was not contacted.
    Noop,
}

impl Verdict {
    pub fn is_accept(self) -> bool {
        self == Verdict::Accept
    }
}

impl From<StatusCode> for Verdict {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::Ok => Verdict::Accept,
            StatusCode::UserUnknown
            | StatusCode::AuthInfoUnavailable
            | StatusCode::AuthError
            | StatusCode::InvalidPin => Verdict::Reject,
            StatusCode::MaxTriesExceeded | StatusCode::NextPasscodeRequired => Verdict::LockOut,
            StatusCode::ServiceError => Verdict::Fail,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Accept => "accept",
            Verdict::Reject => "reject",
            Verdict::LockOut => "lock-out",
            Verdict::Fail => "fail",
            Verdict::Invalid => "invalid",
            Verdict::Noop => "noop",
        })
    }
}
