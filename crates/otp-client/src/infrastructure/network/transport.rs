//! Full-frame send and receive over a connected stream.
//!
//! Frames have no length prefix, so a short read or write is never a frame
//! boundary: both functions loop until the whole frame has moved.
//!
//! # Disconnect versus error
//!
//! A daemon that restarts closes its end of every connection.  The next
//! read on such a connection returns zero bytes (EOF), and a write may fail
//! with `BrokenPipe` or `ConnectionReset`.  These are reported as
//! [`TransportError::Disconnected`] because a fresh connection will most
//! likely succeed.  Anything else is a hard [`TransportError::Io`] and is not
//! worth retrying.
//!
//! `Interrupted` means a signal arrived mid-call and the call is simply
//! repeated.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Failure to move one full frame.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the stream.
    #[error("peer closed the connection")]
    Disconnected,

    /// Any other read or write failure, timeouts included.
    #[error("stream I/O error: {0}")]
    Io(#[source] io::Error),
}

impl TransportError {
    fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => TransportError::Disconnected,
            _ => TransportError::Io(e),
        }
    }
}

/// Writes all of `frame` to `stream`.
///
/// # Errors
///
/// Returns [`TransportError::Disconnected`] if the stream accepts zero bytes
/// or the peer has gone away, and [`TransportError::Io`] for any other
/// failure.
pub fn send_frame<W: Write + ?Sized>(stream: &mut W, frame: &[u8]) -> Result<(), TransportError> {
    let mut written = 0;
    while written < frame.len() {
        match stream.write(&frame[written..]) {
            Ok(0) => return Err(TransportError::Disconnected),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::from_io(e)),
        }
    }
    loop {
        match stream.flush() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::from_io(e)),
        }
    }
}

/// Fills `frame` completely from `stream`.
///
/// # Errors
///
/// Returns [`TransportError::Disconnected`] on EOF (even part-way through a
/// frame) or when the peer has gone away, and [`TransportError::Io`] for any
/// other failure.
pub fn receive_frame<R: Read + ?Sized>(
    stream: &mut R,
    frame: &mut [u8],
) -> Result<(), TransportError> {
    let mut filled = 0;
    while filled < frame.len() {
        match stream.read(&mut frame[filled..]) {
            Ok(0) => return Err(TransportError::Disconnected),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::from_io(e)),
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
