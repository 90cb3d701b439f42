//! Push/pull messaging over a Unix domain socket.
//!
//! The coordinator binds one pull endpoint at `<pipe_dir>/dataflow-pipe-<id>`
//! and every worker connects a [`MessagePusher`] to it. Backpressure is
//! applied on both sides:
//!
//! - a pusher keeps at most `send_hwm` messages unacknowledged and blocks on
//!   the acknowledgement stream once it reaches that mark;
//! - each accepted connection has a reader thread that hands frames to an
//!   inbox holding at most `recv_hwm` messages, and only acknowledges a frame
//!   once the inbox took it.
//!
//! Frames stay encoded until the consumer pulls them from the inbox.

use super::{RecordSink, TransportContext};
use crate::codec::{read_frame, write_frame};
use crate::error::{PrefetchError, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use uuid::Uuid;

const ACK: u8 = 1;
const BIND_ATTEMPTS: usize = 8;
const PIPE_PREFIX: &str = "dataflow-pipe-";
// sun_path is 108 bytes on Linux, including the trailing NUL.
const MAX_SOCKET_PATH: usize = 107;

/// Address of a message transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcAddress {
    path: PathBuf,
}

impl IpcAddress {
    /// A fresh address under `dir` with a random six character suffix.
    pub fn generate(dir: &Path) -> Result<Self> {
        let suffix = Uuid::new_v4().simple().to_string();
        let path = dir.join(format!("{}{}", PIPE_PREFIX, &suffix[..6]));
        if path.as_os_str().len() > MAX_SOCKET_PATH {
            return Err(PrefetchError::EndpointPathTooLong(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Display for IpcAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ipc://{}", self.path.display())
    }
}

/// Fail fast unless `dir` exists, is a directory, and accepts new files.
pub fn ensure_endpoint_dir(dir: &Path) -> Result<()> {
    let unusable = |reason: String| PrefetchError::EndpointDirectory {
        path: dir.to_path_buf(),
        reason,
    };

    let metadata = std::fs::metadata(dir).map_err(|e| unusable(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(unusable("not a directory".to_string()));
    }

    tempfile::Builder::new()
        .prefix(".dataflow-probe-")
        .tempfile_in(dir)
        .map_err(|e| unusable(format!("not writable: {}", e)))?;
    Ok(())
}

pub struct MessageTransport {
    address: IpcAddress,
    listener: Option<UnixListener>,
    send_hwm: usize,
    inbox: Option<Receiver<Vec<u8>>>,
    inbox_tx: Option<SyncSender<Vec<u8>>>,
    context: Arc<MessageContext>,
}

impl MessageTransport {
    /// Bind a pull endpoint in `dir`.
    pub fn bind(dir: &Path, recv_hwm: usize, send_hwm: usize) -> Result<Self> {
        if recv_hwm == 0 || send_hwm == 0 {
            return Err(PrefetchError::Config(
                "high-water marks must be at least 1".to_string(),
            ));
        }
        ensure_endpoint_dir(dir)?;

        let mut attempt = 0;
        let (address, listener) = loop {
            attempt += 1;
            let address = IpcAddress::generate(dir)?;
            match UnixListener::bind(address.path()) {
                Ok(listener) => break (address, listener),
                Err(e) if e.kind() == ErrorKind::AddrInUse && attempt < BIND_ATTEMPTS => {
                    tracing::debug!("Endpoint {} already taken, retrying", address);
                }
                Err(source) => {
                    return Err(PrefetchError::Bind {
                        address: address.to_string(),
                        source,
                    })
                }
            }
        };

        tracing::debug!(
            "Bound pull endpoint {} (recv_hwm={}, send_hwm={})",
            address,
            recv_hwm,
            send_hwm
        );

        let (inbox_tx, inbox) = mpsc::sync_channel(recv_hwm);
        let context = Arc::new(MessageContext {
            path: address.path().to_path_buf(),
            destroyed: AtomicBool::new(false),
            connections: Mutex::new(Vec::new()),
        });

        Ok(Self {
            address,
            listener: Some(listener),
            send_hwm,
            inbox: Some(inbox),
            inbox_tx: Some(inbox_tx),
            context,
        })
    }

    pub fn address(&self) -> &IpcAddress {
        &self.address
    }

    /// Connect a pusher to this endpoint.
    pub fn connect(&self) -> Result<MessagePusher> {
        MessagePusher::connect(self.address.path(), self.send_hwm)
    }

    /// Start the acceptor thread. Later calls are no-ops.
    pub fn listen(&mut self) -> Result<()> {
        let (listener, inbox_tx) = match (self.listener.take(), self.inbox_tx.take()) {
            (Some(listener), Some(inbox_tx)) => (listener, inbox_tx),
            _ => return Ok(()),
        };

        let context = self.context.clone();
        thread::Builder::new()
            .name("prefetch-acceptor".to_string())
            .spawn(move || accept_loop(listener, context, inbox_tx))?;
        Ok(())
    }

    /// Next encoded message, blocking while the inbox is empty.
    pub fn recv(&mut self) -> Result<Vec<u8>> {
        let inbox = self.inbox.as_ref().ok_or(PrefetchError::Closed)?;
        inbox.recv().map_err(|_| PrefetchError::Disconnected)
    }

    pub fn context(&self) -> Arc<dyn TransportContext> {
        self.context.clone()
    }
}

impl Drop for MessageTransport {
    fn drop(&mut self) {
        // Unblocks reader threads still waiting on a full inbox.
        self.inbox.take();
        self.context.destroy();
    }
}

fn accept_loop(listener: UnixListener, context: Arc<MessageContext>, inbox: SyncSender<Vec<u8>>) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                if context.is_destroyed() {
                    break;
                }
                tracing::debug!("Failed to accept push connection: {}", e);
                continue;
            }
        };

        let registered = match stream.try_clone() {
            Ok(registered) => registered,
            Err(e) => {
                tracing::debug!("Failed to register push connection: {}", e);
                continue;
            }
        };
        if !context.register(registered) {
            let _ = stream.shutdown(Shutdown::Both);
            break;
        }

        let inbox = inbox.clone();
        if let Err(e) = thread::Builder::new()
            .name("prefetch-reader".to_string())
            .spawn(move || read_loop(stream, inbox))
        {
            tracing::debug!("Failed to start reader thread: {}", e);
        }
    }
}

fn read_loop(mut stream: UnixStream, inbox: SyncSender<Vec<u8>>) {
    while let Ok(Some(frame)) = read_frame(&mut stream) {
        if inbox.send(frame).is_err() {
            break;
        }
        if stream.write_all(&[ACK]).is_err() {
            break;
        }
    }
}

pub struct MessageContext {
    path: PathBuf,
    destroyed: AtomicBool,
    connections: Mutex<Vec<UnixStream>>,
}

impl MessageContext {
    /// Track an accepted connection. Returns false once the context is gone.
    fn register(&self, stream: UnixStream) -> bool {
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_destroyed() {
            return false;
        }
        connections.push(stream);
        true
    }
}

impl TransportContext for MessageContext {
    fn destroy(&self) {
        let connections = {
            let mut connections = self
                .connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.destroyed.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *connections)
        };

        // Wake the acceptor so it observes the flag and exits.
        let _ = UnixStream::connect(&self.path);
        for connection in connections {
            let _ = connection.shutdown(Shutdown::Both);
        }
        let _ = std::fs::remove_file(&self.path);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Worker-side connection to a pull endpoint.
pub struct MessagePusher {
    stream: UnixStream,
    send_hwm: usize,
    in_flight: usize,
}

impl MessagePusher {
    pub fn connect(path: &Path, send_hwm: usize) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        Ok(Self {
            stream,
            send_hwm: send_hwm.max(1),
            in_flight: 0,
        })
    }

    fn collect_acks(&mut self) -> Result<()> {
        let mut acks = [0u8; 64];
        let want = self.in_flight.min(acks.len());
        loop {
            match self.stream.read(&mut acks[..want]) {
                Ok(0) => return Err(PrefetchError::Disconnected),
                Ok(n) => {
                    self.in_flight -= n;
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl RecordSink for MessagePusher {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        while self.in_flight >= self.send_hwm {
            self.collect_acks()?;
        }
        write_frame(&mut self.stream, frame)?;
        self.in_flight += 1;
        Ok(())
    }
}
