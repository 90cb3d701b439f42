//! Bounded channels carrying encoded records from workers to the coordinator.
//!
//! Two interchangeable backends:
//!
//! - [`QueueTransport`]: one bounded FIFO shared by every worker, built from
//!   pipes inherited across `fork`.
//! - [`MessageTransport`]: push/pull messaging over a Unix domain socket, with
//!   a send high-water mark per pushing connection and a receive high-water
//!   mark on the pull side.
//!
//! The coordinator owns the receiving half. Workers obtain their sending half
//! with [`Transport::connect_sink`] after they fork.

pub mod message;
pub mod queue;

pub use message::{IpcAddress, MessagePusher, MessageTransport};
pub use queue::{QueueProducer, QueueTransport};

use crate::config::{PrefetchConfig, TransportKind};
use crate::error::Result;
use std::sync::Arc;

/// Worker-side half of a transport.
pub trait RecordSink {
    /// Send one encoded record, blocking while the transport is full.
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}

/// Shared teardown handle for a transport's underlying resources.
///
/// Destruction does not drain in-flight messages and only happens once.
pub trait TransportContext: Send + Sync {
    fn destroy(&self);
    fn is_destroyed(&self) -> bool;
}

pub enum Transport {
    Queue(QueueTransport),
    Message(MessageTransport),
}

impl Transport {
    pub fn open(config: &PrefetchConfig) -> Result<Self> {
        match config.transport {
            TransportKind::Queue => Ok(Transport::Queue(QueueTransport::new(
                config.buffer_depth,
            )?)),
            TransportKind::Message => Ok(Transport::Message(MessageTransport::bind(
                &config.pipe_dir,
                config.buffer_depth,
                config.send_hwm,
            )?)),
        }
    }

    pub fn connect_sink(&self) -> Result<Box<dyn RecordSink>> {
        match self {
            Transport::Queue(queue) => Ok(Box::new(queue.producer()?)),
            Transport::Message(message) => Ok(Box::new(message.connect()?)),
        }
    }

    /// Begin accepting records. Called once workers have been spawned.
    pub fn start_receiving(&mut self) -> Result<()> {
        match self {
            Transport::Queue(_) => Ok(()),
            Transport::Message(message) => message.listen(),
        }
    }

    pub fn recv(&mut self) -> Result<Vec<u8>> {
        match self {
            Transport::Queue(queue) => queue.recv(),
            Transport::Message(message) => message.recv(),
        }
    }

    pub fn context(&self) -> Arc<dyn TransportContext> {
        match self {
            Transport::Queue(queue) => queue.context(),
            Transport::Message(message) => message.context(),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Queue(_) => TransportKind::Queue,
            Transport::Message(_) => TransportKind::Message,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            Transport::Queue(queue) => format!("queue(capacity={})", queue.capacity()),
            Transport::Message(message) => message.address().to_string(),
        }
    }
}
