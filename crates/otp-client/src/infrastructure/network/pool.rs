//! Grow-only pool of connections to otpd endpoints.
//!
//! # Why a pool at all? (for beginners)
//!
//! The otpd protocol has no request identifier.  If two threads wrote
//! requests down the same socket, there would be no way to tell which reply
//! belongs to whom.  So each connection carries at most one request at a
//! time, and a busy server needs as many connections as it has concurrent
//! verifications.
//!
//! # Acquisition never waits
//!
//! [`ConnectionPool::acquire`] walks the pool from the most recently added
//! connection to the oldest and *tries* to claim each one that matches the
//! endpoint.  A claim is a single compare-and-swap: it either succeeds at
//! once or the connection is busy and the walk moves on.  If nothing is
//! free, a new connection is allocated already claimed by the caller.
//!
//! Waiting would mean waiting on another thread's socket I/O, which has no
//! upper bound.  Allocating instead means the pool grows to the peak number
//! of concurrent callers and stays there.
//!
//! # Lifetime
//!
//! Connections are never removed from the pool.  A dropped connection just
//! loses its socket and is reconnected lazily by the next holder.  The list
//! lock is taken for reading during the non-blocking walk and for writing
//! only to append; it is never held across socket I/O.

use std::fmt;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// Address of one otpd instance; the pool's lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(PathBuf);

impl Endpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens a new stream to an endpoint.
///
/// The client calls this whenever it holds a connection without a socket.
pub trait Connector: Send + Sync {
    type Stream: Read + Write + Send;

    /// Connects synchronously.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the endpoint cannot be reached.
    fn connect(&self, endpoint: &Endpoint) -> io::Result<Self::Stream>;
}

/// Connects to otpd over a Unix domain stream socket.
#[derive(Debug, Clone, Default)]
pub struct UnixConnector {
    io_timeout: Option<Duration>,
}

impl UnixConnector {
    /// Creates a connector with no read/write deadlines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `timeout` as both read and write deadline on every new stream.
    ///
    /// `None` or a zero duration leaves the stream fully blocking.
    pub fn with_io_timeout(timeout: Option<Duration>) -> Self {
        Self {
            io_timeout: timeout.filter(|t| !t.is_zero()),
        }
    }
}

impl Connector for UnixConnector {
    type Stream = UnixStream;

    fn connect(&self, endpoint: &Endpoint) -> io::Result<UnixStream> {
        let stream = UnixStream::connect(endpoint.path())?;
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;
        Ok(stream)
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// One pool slot: an endpoint, an optional open stream, and a claim flag.
///
/// While `in_use` is set, the stream has been moved out to the holder's
/// [`PooledConnection`] and only the holder touches it.
struct Connection<S> {
    id: u64,
    endpoint: Endpoint,
    in_use: AtomicBool,
    stream: Mutex<Option<S>>,
}

impl<S> Connection<S> {
    /// Claims the connection if nobody holds it.  Never blocks.
    fn try_claim(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

// ── Pool ──────────────────────────────────────────────────────────────────────

/// Process-wide set of connections, shared by every verifying thread.
///
/// Share it behind an [`Arc`] and hand it to each
/// [`VerificationClient`](super::client::VerificationClient).
pub struct ConnectionPool<S> {
    connections: RwLock<Vec<Arc<Connection<S>>>>,
    next_id: AtomicU64,
}

impl<S> Default for ConnectionPool<S> {
    fn default() -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<S> ConnectionPool<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a connection to `endpoint` held exclusively by the caller.
    ///
    /// Reuses the most recently added free connection to `endpoint`, or
    /// allocates a new (closed) one when every match is busy.  Never waits
    /// for another holder.
    pub fn acquire(&self, endpoint: &Endpoint) -> PooledConnection<S> {
        if let Some(conn) = self.claim_existing(endpoint) {
            return PooledConnection::claim(conn);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection {
            id,
            endpoint: endpoint.clone(),
            in_use: AtomicBool::new(true),
            stream: Mutex::new(None),
        });
        let size = {
            let mut connections = self
                .connections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            connections.push(Arc::clone(&conn));
            connections.len()
        };
        debug!("allocated connection {id} to {endpoint}; pool size {size}");

        PooledConnection::claim(conn)
    }

    fn claim_existing(&self, endpoint: &Endpoint) -> Option<Arc<Connection<S>>> {
        let connections = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        connections
            .iter()
            .rev()
            .find(|conn| conn.endpoint == *endpoint && conn.try_claim())
            .cloned()
    }

    /// Total number of connections ever allocated.
    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of connections currently held by a caller.
    pub fn in_use_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|conn| conn.in_use.load(Ordering::Acquire))
            .count()
    }
}

// ── Pooled connection guard ───────────────────────────────────────────────────

/// Exclusive hold on one pool connection.
///
/// Give it back with [`release`](Self::release).  A guard that is dropped
/// without an explicit release (early return, panic) is released *with*
/// disconnect: its stream may be part-way through a frame and must not be
/// reused.
pub struct PooledConnection<S> {
    conn: Arc<Connection<S>>,
    stream: Option<S>,
    disconnect: bool,
}

impl<S> PooledConnection<S> {
    fn claim(conn: Arc<Connection<S>>) -> Self {
        let stream = conn
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Self {
            conn,
            stream,
            disconnect: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.conn.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.conn.endpoint
    }

    /// Whether the connection has a live socket.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns the open stream, connecting first if the connection is closed.
    ///
    /// A failed connect leaves the connection closed.
    ///
    /// # Errors
    ///
    /// Returns whatever `connect` returns.
    pub fn connect_with<F>(&mut self, connect: F) -> io::Result<&mut S>
    where
        F: FnOnce(&Endpoint) -> io::Result<S>,
    {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                let stream = connect(&self.conn.endpoint)?;
                debug!("connection {} connected to {}", self.conn.id, self.conn.endpoint);
                stream
            }
        };
        Ok(self.stream.insert(stream))
    }

    /// Makes the connection available to other callers.
    ///
    /// With `disconnect` set, the socket is closed first and the next holder
    /// reconnects.
    pub fn release(mut self, disconnect: bool) {
        self.disconnect = disconnect;
    }
}

impl<S> Drop for PooledConnection<S> {
    fn drop(&mut self) {
        let stream = self.stream.take();
        let kept = if self.disconnect {
            if stream.is_some() {
                debug!("closing connection {} to {}", self.conn.id, self.conn.endpoint);
            }
            None
        } else {
            stream
        };
        *self
            .conn
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = kept;
        self.conn.in_use.store(false, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
