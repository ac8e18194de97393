//! In-process stand-in for otpd.
//!
//! [`FakeDaemon`] listens on a Unix socket in a fresh temp directory and
//! serves each accepted connection on its own thread.  Every complete
//! request frame is decoded with `otp_core::decode_request`; a frame that
//! does not decode (bytes from two requests interleaved, a short write) is
//! counted in [`FakeDaemon::bad_frames`] and the connection is closed.
//! Otherwise the test's handler decides what happens next.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use otp_client::infrastructure::network::{
    ConnectionPool, Connector, Endpoint, UnixConnector, VerificationClient,
};
use otp_core::protocol::messages::REQUEST_FRAME_SIZE;
use otp_core::{
    decode_request, encode_reply, Credential, Passcode, StatusCode, VerificationReply,
    VerificationRequest,
};
use uuid::Uuid;

/// One decoded request, as seen by the daemon.
pub struct Exchange {
    /// Zero-based accept order of the connection it arrived on.
    pub connection: usize,
    pub request: VerificationRequest,
}

/// What the daemon does with a request.
pub enum Action {
    Reply(Vec<u8>),
    ReplyAfter(Duration, Vec<u8>),
    /// Answer, then hang up before the next request.
    ReplyThenClose(Vec<u8>),
    /// Hang up without answering.
    Close,
}

type Handler = dyn Fn(&Exchange) -> Action + Send + Sync;

pub struct FakeDaemon {
    dir: PathBuf,
    path: PathBuf,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    bad_frames: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<VerificationRequest>>>,
}

impl FakeDaemon {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Exchange) -> Action + Send + Sync + 'static,
    {
        let dir = temp_dir();
        let path = dir.join("otpd.sock");
        let listener = UnixListener::bind(&path).expect("bind fake otpd socket");

        let daemon = Self {
            dir,
            path,
            accepted: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            bad_frames: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let handler: Arc<Handler> = Arc::new(handler);
        let accepted = Arc::clone(&daemon.accepted);
        let closed = Arc::clone(&daemon.closed);
        let bad_frames = Arc::clone(&daemon.bad_frames);
        let requests = Arc::clone(&daemon.requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let connection = accepted.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                let closed = Arc::clone(&closed);
                let bad_frames = Arc::clone(&bad_frames);
                let requests = Arc::clone(&requests);
                thread::spawn(move || {
                    serve(stream, connection, &*handler, &bad_frames, &requests);
                    closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        daemon
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.path)
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections the daemon has finished with and closed.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn bad_frames(&self) -> usize {
        self.bad_frames.load(Ordering::SeqCst)
    }

    /// Every request decoded so far, in arrival order.
    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

fn serve(
    mut stream: UnixStream,
    connection: usize,
    handler: &Handler,
    bad_frames: &AtomicUsize,
    requests: &Mutex<Vec<VerificationRequest>>,
) {
    let mut frame = [0u8; REQUEST_FRAME_SIZE];
    loop {
        if stream.read_exact(&mut frame).is_err() {
            return;
        }
        let request = match decode_request(&frame) {
            Ok(request) => request,
            Err(_) => {
                bad_frames.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };
        requests.lock().unwrap().push(request.clone());

        let action = handler(&Exchange {
            connection,
            request,
        });
        let bytes = match action {
            Action::Reply(bytes) => bytes,
            Action::ReplyAfter(delay, bytes) => {
                thread::sleep(delay);
                bytes
            }
            Action::ReplyThenClose(bytes) => {
                stream.write_all(&bytes).ok();
                return;
            }
            Action::Close => return,
        };
        if stream.write_all(&bytes).is_err() {
            return;
        }
    }
}

/// A fresh, empty directory under the system temp dir.
pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("otp_it_{}", Uuid::new_v4().simple()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(std::time::Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

/// A well-formed reply frame.
pub fn reply(status: StatusCode, passcode: &str) -> Vec<u8> {
    let reply = VerificationReply {
        status,
        passcode: Passcode::new(passcode).expect("passcode fits"),
    };
    encode_reply(&reply).to_vec()
}

/// Answers every PAP request with `ok` and the passcode it carried.
pub fn echo(exchange: &Exchange) -> Action {
    match exchange.request.credential() {
        Credential::Pap(passcode) => {
            Action::Reply(reply(StatusCode::Ok, passcode.expose()))
        }
        _ => Action::Reply(reply(StatusCode::AuthError, "")),
    }
}

/// Wraps [`UnixConnector`] and counts connect attempts.
pub struct CountingConnector {
    inner: UnixConnector,
    connects: Arc<AtomicUsize>,
}

impl Connector for CountingConnector {
    type Stream = UnixStream;

    fn connect(&self, endpoint: &Endpoint) -> io::Result<UnixStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(endpoint)
    }
}

/// A client with its own pool, plus a live count of its connect attempts.
pub fn counting_client(
    endpoint: Endpoint,
    io_timeout: Option<Duration>,
) -> (VerificationClient<CountingConnector>, Arc<AtomicUsize>) {
    let connects = Arc::new(AtomicUsize::new(0));
    let connector = CountingConnector {
        inner: UnixConnector::with_io_timeout(io_timeout),
        connects: Arc::clone(&connects),
    };
    let client = VerificationClient::new(Arc::new(ConnectionPool::new()), connector, endpoint);
    (client, connects)
}
