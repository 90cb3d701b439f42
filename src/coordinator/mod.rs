//! The coordinator: owns worker processes and the transport, and turns them
//! into one record stream for the consumer.
//!
//! # Lifecycle
//!
//! ```text
//!   new() ──► Init ──start()──► Running ──close()/drop/exit──► Closed
//!              │                                               ▲
//!              └────────────────close()/drop/exit───────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dataflow_prefetch::{Coordinator, PrefetchConfig, RangeSource};
//!
//! let config = PrefetchConfig::queue(1, 2);
//! let mut coordinator = Coordinator::spawn(RangeSource::new(0, 5), config)?;
//! let records: Vec<u64> = coordinator.records()?.collect::<Result<_, _>>()?;
//! assert_eq!(records, vec![0, 1, 2, 3, 4]);
//! coordinator.close();
//! # Ok::<(), dataflow_prefetch::PrefetchError>(())
//! ```

mod shutdown;


use crate::codec::{Codec, JsonCodec};
use crate::config::PrefetchConfig;
use crate::error::{PrefetchError, Result};
use crate::source::{Count, SourcePipeline};
use crate::transport::Transport;
use crate::worker::{self, InterruptMask};
use shutdown::Teardown;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Endpoint created, workers not started.
    Init,
    /// Workers running; the consumer may pull.
    Running,
    /// Resources released.
    Closed,
}

pub struct Coordinator<P: SourcePipeline, C: Codec = JsonCodec> {
    source: Option<P>,
    codec: C,
    config: PrefetchConfig,
    count: Count,
    transport: Option<Transport>,
    teardown: Arc<Teardown>,
}

impl<P: SourcePipeline> Coordinator<P, JsonCodec> {
    /// Create the endpoint without starting workers.
    pub fn new(source: P, config: PrefetchConfig) -> Result<Self> {
        Self::with_codec(source, config, JsonCodec)
    }

    /// Create the endpoint and start all workers.
    pub fn spawn(source: P, config: PrefetchConfig) -> Result<Self> {
        let mut coordinator = Self::new(source, config)?;
        coordinator.start()?;
        Ok(coordinator)
    }
}

impl<P: SourcePipeline, C: Codec> Coordinator<P, C> {
    pub fn with_codec(source: P, config: PrefetchConfig, codec: C) -> Result<Self> {
        config.validate()?;

        let count = Count::from(source.size());
        if !count.is_known() {
            tracing::debug!("Source pipeline does not report its size; count is unknown");
        }

        let transport = Transport::open(&config)?;
        let teardown = Teardown::new(transport.context(), transport.endpoint());
        shutdown::register_exit_hook(&teardown);

        tracing::debug!(
            "Prefetching through {} with {} worker(s), count {}",
            transport.endpoint(),
            config.workers,
            count
        );

        Ok(Self {
            source: Some(source),
            codec,
            config,
            count,
            transport: Some(transport),
            teardown,
        })
    }

    /// Fork every worker and start receiving. Moves `Init` to `Running`.
    pub fn start(&mut self) -> Result<()> {
        match self.teardown.state() {
            LifecycleState::Init => {}
            LifecycleState::Running => return Err(PrefetchError::AlreadyStarted),
            LifecycleState::Closed => return Err(PrefetchError::Closed),
        }
        let mut source = self.source.take().ok_or(PrefetchError::AlreadyStarted)?;
        let transport = self.transport.as_mut().ok_or(PrefetchError::Closed)?;

        let spawned = (|| -> Result<()> {
            let _mask = if self.config.mask_signals {
                Some(InterruptMask::block()?)
            } else {
                None
            };
            for _ in 0..self.config.workers {
                let handle = worker::spawn(&mut source, &self.codec, transport)?;
                tracing::debug!("Started prefetch worker {}", handle.pid());
                self.teardown.add_worker(handle);
            }
            transport.start_receiving()
        })();

        if let Err(e) = spawned {
            tracing::warn!("Failed to start prefetch workers: {}", e);
            self.close();
            return Err(e);
        }

        self.teardown.mark_running();
        Ok(())
    }

    /// One epoch of records.
    ///
    /// With a positive known count the iterator stops after exactly that many
    /// records, whatever the workers still have queued. Otherwise it never
    /// ends. Each call starts a new epoch.
    pub fn records(&mut self) -> Result<Records<'_, P, C>> {
        self.ensure_running()?;
        let limit = self.count.limit();
        Ok(Records {
            coordinator: self,
            limit,
            yielded: 0,
            failed: false,
        })
    }

    /// Pull the next record, blocking until a worker delivers one.
    pub fn next_record(&mut self) -> Result<P::Record> {
        self.ensure_running()?;
        let transport = self.transport.as_mut().ok_or(PrefetchError::Closed)?;
        let frame = transport.recv()?;
        self.codec.decode(&frame)
    }

    pub fn count(&self) -> Count {
        self.count
    }

    pub fn state(&self) -> LifecycleState {
        self.teardown.state()
    }

    /// Release workers and transport. Calling it again does nothing.
    pub fn close(&mut self) {
        self.teardown.release();
        self.transport.take();
        self.source.take();
    }

    fn ensure_running(&self) -> Result<()> {
        match self.teardown.state() {
            LifecycleState::Running => Ok(()),
            LifecycleState::Init => Err(PrefetchError::NotStarted),
            LifecycleState::Closed => Err(PrefetchError::Closed),
        }
    }

    #[cfg(test)]
    pub(crate) fn live_workers(&self) -> usize {
        self.teardown.live_workers()
    }

    #[cfg(test)]
    pub(crate) fn worker_pids(&self) -> Vec<nix::unistd::Pid> {
        self.teardown.worker_pids()
    }

    #[cfg(test)]
    pub(crate) fn endpoint(&self) -> Option<String> {
        self.transport.as_ref().map(Transport::endpoint)
    }
}

impl<P: SourcePipeline, C: Codec> Drop for Coordinator<P, C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator over one epoch of a [`Coordinator`]'s records.
pub struct Records<'a, P: SourcePipeline, C: Codec> {
    coordinator: &'a mut Coordinator<P, C>,
    limit: Option<usize>,
    yielded: usize,
    failed: bool,
}

impl<P: SourcePipeline, C: Codec> Records<'_, P, C> {
    pub fn yielded(&self) -> usize {
        self.yielded
    }
}

impl<P: SourcePipeline, C: Codec> Iterator for Records<'_, P, C> {
    type Item = Result<P::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.limit.is_some_and(|limit| self.yielded >= limit) {
            return None;
        }
        match self.coordinator.next_record() {
            Ok(record) => {
                self.yielded += 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.limit {
            Some(limit) if !self.failed => (0, Some(limit - self.yielded)),
            Some(_) => (0, Some(0)),
            None if self.failed => (0, Some(0)),
            None => (usize::MAX, None),
        }
    }
}
