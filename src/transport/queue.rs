//! Bounded multi-producer FIFO that survives `fork`.
//!
//! Three pipes make up the queue:
//!
//! - `slots`: pre-filled with one token per free slot. A producer takes a token
//!   before pushing and the consumer returns one after each pop, so at most
//!   `capacity` records are ever in flight.
//! - `lock`: holds a single token; a producer owns the data pipe while it
//!   holds it, which keeps frames from different workers from interleaving.
//! - `data`: length-prefixed frames.

use super::{RecordSink, TransportContext};
use crate::codec::{read_frame, write_frame};
use crate::config::MAX_QUEUE_CAPACITY;
use crate::error::{PrefetchError, Result};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const TOKEN: u8 = 1;

fn pipe_pair() -> Result<(File, File)> {
    let (rx, tx) = nix::unistd::pipe().map_err(std::io::Error::from)?;
    Ok((File::from(rx), File::from(tx)))
}

fn take_token(reader: &mut File) -> Result<()> {
    let mut token = [0u8; 1];
    loop {
        match reader.read(&mut token) {
            Ok(0) => return Err(PrefetchError::Disconnected),
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

pub struct QueueTransport {
    capacity: usize,
    producer: QueueProducer,
    data_rx: File,
    slots_tx: File,
    context: Arc<QueueContext>,
}

impl QueueTransport {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
            return Err(PrefetchError::Config(format!(
                "queue capacity must be between 1 and {}, got {}",
                MAX_QUEUE_CAPACITY, capacity
            )));
        }

        let (slots_rx, mut slots_tx) = pipe_pair()?;
        let (lock_rx, mut lock_tx) = pipe_pair()?;
        let (data_rx, data_tx) = pipe_pair()?;

        slots_tx.write_all(&vec![TOKEN; capacity])?;
        lock_tx.write_all(&[TOKEN])?;

        tracing::debug!("Created bounded queue with capacity {}", capacity);

        Ok(Self {
            capacity,
            producer: QueueProducer {
                slots_rx,
                lock_rx,
                lock_tx,
                data_tx,
            },
            data_rx,
            slots_tx,
            context: Arc::new(QueueContext::default()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A producer handle sharing this queue.
    pub fn producer(&self) -> Result<QueueProducer> {
        self.producer.try_clone()
    }

    /// Pop the oldest frame, blocking while the queue is empty.
    pub fn recv(&mut self) -> Result<Vec<u8>> {
        let frame = read_frame(&mut self.data_rx)?.ok_or(PrefetchError::Disconnected)?;
        self.slots_tx.write_all(&[TOKEN])?;
        Ok(frame)
    }

    pub fn context(&self) -> Arc<dyn TransportContext> {
        self.context.clone()
    }
}

/// Producer side of a [`QueueTransport`]; inherited by forked workers.
pub struct QueueProducer {
    slots_rx: File,
    lock_rx: File,
    lock_tx: File,
    data_tx: File,
}

impl QueueProducer {
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            slots_rx: self.slots_rx.try_clone()?,
            lock_rx: self.lock_rx.try_clone()?,
            lock_tx: self.lock_tx.try_clone()?,
            data_tx: self.data_tx.try_clone()?,
        })
    }
}

impl RecordSink for QueueProducer {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        take_token(&mut self.slots_rx)?;
        take_token(&mut self.lock_rx)?;
        let written = write_frame(&mut self.data_tx, frame);
        let released = self.lock_tx.write_all(&[TOKEN]);
        written?;
        released?;
        Ok(())
    }
}

/// The pipes close with their owners; this only records that teardown ran.
#[derive(Debug, Default)]
pub struct QueueContext {
    destroyed: AtomicBool,
}

impl TransportContext for QueueContext {
    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}
