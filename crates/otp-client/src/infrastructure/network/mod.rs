//! Network infrastructure for talking to otpd.
//!
//! # Sub-modules
//!
//! - **`transport`** – Full-frame send and receive over a connected stream,
//!   with a clean peer disconnect reported separately from a hard I/O error.
//!
//! - **`pool`** – Endpoint-keyed, grow-only set of connections.  Acquisition
//!   never waits on another thread's socket: if every matching connection is
//!   busy, a new one is allocated.
//!
//! - **`client`** – One verification: acquire, send, receive, validate,
//!   release, with a single retry when the daemon hung up on us.

pub mod client;
pub mod pool;
pub mod transport;

pub use client::{ClientError, VerificationClient, MAX_ATTEMPTS};
pub use pool::{ConnectionPool, Connector, Endpoint, PooledConnection, UnixConnector};
pub use transport::{receive_frame, send_frame, TransportError};
