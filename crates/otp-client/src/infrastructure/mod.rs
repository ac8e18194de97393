//! Infrastructure layer for the verification client.
//!
//! Contains OS-facing adapters: the Unix-socket transport, the connection
//! pool, the verification client that drives them, and configuration file
//! loading.
//!
//! **Dependency rule**: this layer may depend on `otp_core`, but MUST NOT be
//! imported by `otp_core`.

pub mod network;
pub mod storage;
