//! Application layer use cases for the verification client.
//!
//! # What use cases does the client have?
//!
//! - **`verify_passcode`** – Turns the credential material extracted from an
//!   authentication request into a typed otpd request, runs it through a
//!   [`VerificationService`](verify_passcode::VerificationService), and maps
//!   the daemon's answer (or the absence of one) to a
//!   [`Verdict`](otp_core::Verdict).  The service is injected at
//!   construction time; production code passes a
//!   [`VerificationClient`](crate::infrastructure::network::VerificationClient).

pub mod verify_passcode;
