//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML file that tells the client where
//! otpd listens and which verification policy to request.  A missing file is
//! not an error; every setting has a default.

pub mod config;
