//! One verification round trip against otpd.
//!
//! # Algorithm
//!
//! 1. Claim a connection from the pool, connecting it if it is closed.  A
//!    failed connect is final: the daemon is not there, and trying again at
//!    once will not change that.
//! 2. Send the request frame and read one reply frame.
//! 3. If the daemon hung up on us (it restarted since this connection was
//!    last used), drop the connection and start over.  At most
//!    [`MAX_ATTEMPTS`] passes are made per verification.
//! 4. Validate the reply.  A malformed reply means the stream can no longer
//!    be trusted to be frame-aligned, so the connection is dropped.
//! 5. On success the connection goes back to the pool still open.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use otp_core::protocol::codec::{decode_reply, encode_request, ProtocolError};
use otp_core::protocol::messages::{
    Credential, VerificationReply, VerificationRequest, REPLY_FRAME_SIZE,
};
use thiserror::Error;
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

use super::pool::{ConnectionPool, Connector, Endpoint};
use super::transport::{receive_frame, send_frame, TransportError};

/// Passes through connect, send and receive made for a single verification.
pub const MAX_ATTEMPTS: u32 = 2;

/// A verification that produced no usable reply.
///
/// Every variant is a system failure, not an authentication decision.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request carries no credential")]
    NoCredential,

    #[error("cannot connect to otpd at {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("I/O error talking to otpd: {0}")]
    Io(#[source] io::Error),

    #[error("otpd closed the connection on {attempts} consecutive attempts")]
    Disconnected { attempts: u32 },

    #[error("invalid reply from otpd: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Why a single pass failed.
enum AttemptError {
    /// The peer hung up; a fresh connection may succeed.
    Disconnected,
    Fatal(ClientError),
}

/// Sends verification requests to one otpd endpoint through a shared pool.
///
/// `verify` takes `&self` and may be called from many threads at once; each
/// call holds its own pooled connection for the duration of the round trip.
pub struct VerificationClient<C: Connector> {
    pool: Arc<ConnectionPool<C::Stream>>,
    connector: C,
    endpoint: Endpoint,
    reconnect_delay: Duration,
}

impl<C: Connector> VerificationClient<C> {
    pub fn new(pool: Arc<ConnectionPool<C::Stream>>, connector: C, endpoint: Endpoint) -> Self {
        Self {
            pool,
            connector,
            endpoint,
            reconnect_delay: Duration::ZERO,
        }
    }

    /// Pause between a disconnect and the reconnect attempt.  Zero (the
    /// default) retries at once.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C::Stream>> {
        &self.pool
    }

    /// Runs one request/reply exchange with otpd.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NoCredential`] if the request has nothing to verify;
    ///   nothing is sent.
    /// - [`ClientError::Connect`] if the socket cannot be opened.
    /// - [`ClientError::Disconnected`] if the daemon hung up on every attempt.
    /// - [`ClientError::Io`] for any other socket failure, timeouts included.
    /// - [`ClientError::Protocol`] if the reply fails validation.
    pub fn verify(&self, request: &VerificationRequest) -> Result<VerificationReply, ClientError> {
        if matches!(request.credential(), Credential::None) {
            return Err(ClientError::NoCredential);
        }

        debug!(
            "verifying {} ({}) via {}",
            request.username(),
            request.credential().tag(),
            self.endpoint
        );
        let frame = encode_request(request);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&frame) {
                Ok(reply) => return Ok(reply),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Disconnected) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "otpd at {} closed the connection (attempt {attempt}/{MAX_ATTEMPTS}), reconnecting",
                        self.endpoint
                    );
                    if !self.reconnect_delay.is_zero() {
                        thread::sleep(self.reconnect_delay);
                    }
                }
                Err(AttemptError::Disconnected) => {}
            }
        }

        error!(
            "otpd at {} closed the connection on all {MAX_ATTEMPTS} attempts",
            self.endpoint
        );
        Err(ClientError::Disconnected {
            attempts: MAX_ATTEMPTS,
        })
    }

    fn attempt(&self, frame: &[u8]) -> Result<VerificationReply, AttemptError> {
        let mut conn = self.pool.acquire(&self.endpoint);
        let id = conn.id();
        let mut reply = Zeroizing::new([0u8; REPLY_FRAME_SIZE]);

        let exchanged = conn
            .connect_with(|endpoint| self.connector.connect(endpoint))
            .map(|stream| exchange(stream, frame, &mut reply[..]));

        match exchanged {
            Ok(Ok(())) => {}
            Ok(Err(TransportError::Disconnected)) => {
                conn.release(true);
                return Err(AttemptError::Disconnected);
            }
            Ok(Err(TransportError::Io(e))) => {
                error!("connection {id} to {}: {e}", self.endpoint);
                conn.release(true);
                return Err(AttemptError::Fatal(ClientError::Io(e)));
            }
            Err(source) => {
                error!("cannot connect to otpd at {}: {source}", self.endpoint);
                conn.release(true);
                return Err(AttemptError::Fatal(ClientError::Connect {
                    endpoint: self.endpoint.clone(),
                    source,
                }));
            }
        }

        match decode_reply(&reply[..]) {
            Ok(reply) => {
                conn.release(false);
                Ok(reply)
            }
            Err(e) => {
                error!("connection {id} to {}: invalid reply: {e}", self.endpoint);
                conn.release(true);
                Err(AttemptError::Fatal(e.into()))
            }
        }
    }
}

fn exchange<S: Read + Write>(
    stream: &mut S,
    request: &[u8],
    reply: &mut [u8],
) -> Result<(), TransportError> {
    send_frame(stream, request)?;
    receive_frame(stream, reply)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
