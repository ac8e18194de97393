//! PasscodeVerifier: one authentication attempt from raw material to verdict.
//!
//! This use case sits at the application layer and delegates the daemon
//! round trip to a [`VerificationService`].  It owns the policy, the input
//! validation and the status-to-verdict mapping, none of which need a socket.

use otp_core::protocol::messages::{
    Credential, Passcode, StatusCode, VerificationReply, VerificationRequest, VerifyPolicy,
};
use otp_core::Verdict;
use tracing::{debug, error, info, warn};

use crate::infrastructure::network::{ClientError, Connector, VerificationClient};

/// Anything that can carry one request to otpd and bring back its reply.
pub trait VerificationService: Send + Sync {
    fn verify(&self, request: &VerificationRequest) -> Result<VerificationReply, ClientError>;
}

impl<C: Connector> VerificationService for VerificationClient<C> {
    fn verify(&self, request: &VerificationRequest) -> Result<VerificationReply, ClientError> {
        VerificationClient::verify(self, request)
    }
}

/// Credential material as extracted from an authentication request, before
/// any size checks.
#[derive(Clone, Copy)]
pub enum CredentialMaterial<'a> {
    /// Nothing usable was supplied.
    None,
    Pap { passcode: &'a str },
    Chap { challenge: &'a [u8], response: &'a [u8] },
    MsChap { challenge: &'a [u8], response: &'a [u8] },
    MsChap2 { challenge: &'a [u8], response: &'a [u8] },
}

impl CredentialMaterial<'_> {
    fn to_credential(self) -> Result<Credential, otp_core::InputError> {
        match self {
            CredentialMaterial::None => Ok(Credential::None),
            CredentialMaterial::Pap { passcode } => Credential::pap(passcode),
            CredentialMaterial::Chap { challenge, response } => {
                Credential::chap(challenge, response)
            }
            CredentialMaterial::MsChap { challenge, response } => {
                Credential::ms_chap(challenge, response)
            }
            CredentialMaterial::MsChap2 { challenge, response } => {
                Credential::ms_chap2(challenge, response)
            }
        }
    }
}

/// Result of one attempt.
#[derive(Debug)]
pub struct VerificationOutcome {
    pub verdict: Verdict,
    /// The cleared passcode; present only when `verdict` is
    /// [`Verdict::Accept`].
    pub passcode: Option<Passcode>,
}

impl VerificationOutcome {
    fn without_passcode(verdict: Verdict) -> Self {
        Self {
            verdict,
            passcode: None,
        }
    }
}

/// Verifies passcodes against otpd with a fixed policy.
pub struct PasscodeVerifier<S> {
    service: S,
    policy: VerifyPolicy,
}

impl<S: VerificationService> PasscodeVerifier<S> {
    /// `resync` is forced on regardless of what `policy` says.
    pub fn new(service: S, policy: VerifyPolicy) -> Self {
        Self {
            service,
            policy: VerifyPolicy {
                resync: true,
                ..policy
            },
        }
    }

    pub fn policy(&self) -> VerifyPolicy {
        self.policy
    }

    /// Runs one verification and never fails: every problem becomes a
    /// verdict.  Only [`Verdict::Accept`] may authorize the user.
    pub fn verify(
        &self,
        username: &str,
        challenge: &str,
        material: CredentialMaterial<'_>,
    ) -> VerificationOutcome {
        if let Err(e) = VerificationRequest::check_identity(username, challenge) {
            warn!("rejecting request: {e}");
            return VerificationOutcome::without_passcode(Verdict::Reject);
        }

        let credential = match material.to_credential() {
            Ok(credential) => credential,
            Err(e) if e.is_malformed_credential() => {
                warn!("{username}: {e}");
                return VerificationOutcome::without_passcode(Verdict::Invalid);
            }
            Err(e) => {
                warn!("{username}: {e}");
                return VerificationOutcome::without_passcode(Verdict::Reject);
            }
        };

        if matches!(credential, Credential::None) {
            debug!("{username}: no credential to verify");
            return VerificationOutcome::without_passcode(Verdict::Noop);
        }

        let method = credential.tag();
        let request = match VerificationRequest::new(username, challenge, credential, self.policy)
        {
            Ok(request) => request,
            Err(e) => {
                warn!("rejecting request: {e}");
                return VerificationOutcome::without_passcode(Verdict::Reject);
            }
        };

        match self.service.verify(&request) {
            Ok(reply) => {
                let verdict = Verdict::from(reply.status);
                info!("{username}: {method} verification {verdict}");
                if reply.status == StatusCode::Ok {
                    VerificationOutcome {
                        verdict,
                        passcode: Some(reply.passcode),
                    }
                } else {
                    VerificationOutcome::without_passcode(verdict)
                }
            }
            Err(e) => {
                error!("{username}: {method} verification failed: {e}");
                VerificationOutcome::without_passcode(Verdict::Fail)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
