//! Worker processes replicating a source pipeline.
//!
//! A worker is a forked copy of the coordinator process that owns its own copy
//! of the pipeline. It resets the pipeline once, then produces records forever,
//! pass after pass, writing each encoded record to its transport sink. Workers
//! have no stop condition; the coordinator ends them with [`WorkerHandle::terminate`].

mod signals;

pub use signals::InterruptMask;

use crate::codec::Codec;
use crate::error::{PrefetchError, Result};
use crate::source::SourcePipeline;
use crate::transport::{RecordSink, Transport};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

const TERMINATE_GRACE: Duration = Duration::from_millis(100);
const REAP_POLL: Duration = Duration::from_millis(5);

/// Exit status of a worker whose transport or codec failed.
pub const EXIT_TRANSPORT_FAILED: i32 = 1;
/// Exit status of a worker whose pipeline panicked.
pub const EXIT_PANICKED: i32 = 101;

/// Produce records forever. Only returns when the sink or codec fails.
pub fn run_pipeline<P, C>(source: &mut P, codec: &C, sink: &mut dyn RecordSink) -> Result<Infallible>
where
    P: SourcePipeline,
    C: Codec,
{
    source.reset_state();
    loop {
        while let Some(record) = source.produce() {
            let frame = codec.encode(&record)?;
            sink.send(&frame)?;
        }
    }
}

/// Fork a worker process running `source` against `transport`.
///
/// The child never returns from this call.
pub fn spawn<P, C>(source: &mut P, codec: &C, transport: &Transport) -> Result<WorkerHandle>
where
    P: SourcePipeline,
    C: Codec,
{
    // SAFETY: only the calling thread survives in the child. The pipeline must
    // not depend on locks or state owned by other parent threads (for example
    // another coordinator's transport threads). The child leaves through
    // `_exit`, so inherited exit hooks never run.
    match unsafe { fork() }.map_err(PrefetchError::Spawn)? {
        ForkResult::Parent { child } => Ok(WorkerHandle::new(child)),
        ForkResult::Child => worker_main(source, codec, transport),
    }
}

fn worker_main<P, C>(source: &mut P, codec: &C, transport: &Transport) -> !
where
    P: SourcePipeline,
    C: Codec,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Infallible> {
        let mut sink = transport.connect_sink()?;
        run_pipeline(source, codec, sink.as_mut())
    }));

    let code = match outcome {
        Ok(Ok(never)) => match never {},
        Ok(Err(_)) => EXIT_TRANSPORT_FAILED,
        Err(_) => EXIT_PANICKED,
    };

    // SAFETY: `_exit` skips atexit handlers and destructors inherited from the
    // parent, which must only run in the process that registered them.
    unsafe { libc::_exit(code) }
}

/// Handle to a running worker process.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Pid,
    reaped: bool,
}

impl WorkerHandle {
    pub fn new(pid: Pid) -> Self {
        Self { pid, reaped: false }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Non-blocking liveness probe. Reaps the process if it has exited.
    pub fn is_alive(&mut self) -> bool {
        if self.reaped {
            return false;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(_) | Err(Errno::ECHILD) => {
                self.reaped = true;
                false
            }
            Err(_) => true,
        }
    }

    /// Terminate and reap the worker: `SIGTERM`, a short grace period, then
    /// `SIGKILL`. Safe to call repeatedly.
    pub fn terminate(&mut self) {
        if self.reaped {
            return;
        }

        match kill(self.pid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                self.reap_blocking();
                return;
            }
            Err(e) => tracing::debug!("Failed to signal worker {}: {}", self.pid, e),
        }

        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if !self.is_alive() {
                return;
            }
            std::thread::sleep(REAP_POLL);
        }

        if let Err(e) = kill(self.pid, Signal::SIGKILL) {
            if e != Errno::ESRCH {
                tracing::debug!("Failed to kill worker {}: {}", self.pid, e);
            }
        }
        self.reap_blocking();
    }

    fn reap_blocking(&mut self) {
        loop {
            match waitpid(self.pid, None) {
                Err(Errno::EINTR) => continue,
                _ => break,
            }
        }
        self.reaped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::source::RangeSource;
    use crate::transport::QueueTransport;

    struct CollectSink {
        frames: Vec<Vec<u8>>,
        limit: usize,
    }

    impl RecordSink for CollectSink {
        fn send(&mut self, frame: &[u8]) -> Result<()> {
            if self.frames.len() == self.limit {
                return Err(PrefetchError::Disconnected);
            }
            self.frames.push(frame.to_vec());
            Ok(())
        }
    }

    struct CountingReset {
        inner: RangeSource,
        resets: usize,
    }

    impl SourcePipeline for CountingReset {
        type Record = (usize, u64);

        fn reset_state(&mut self) {
            self.resets += 1;
            self.inner.reset_state();
        }

        fn produce(&mut self) -> Option<Self::Record> {
            self.inner.produce().map(|v| (self.resets, v))
        }
    }

    #[test]
    fn test_run_pipeline_loops_across_passes_with_single_reset() {
        let mut source = CountingReset {
            inner: RangeSource::new(0, 3),
            resets: 0,
        };
        let mut sink = CollectSink {
            frames: Vec::new(),
            limit: 7,
        };

        let result = run_pipeline(&mut source, &JsonCodec, &mut sink);
        assert!(matches!(result, Err(PrefetchError::Disconnected)));

        let records: Vec<(usize, u64)> = sink
            .frames
            .iter()
            .map(|f| JsonCodec.decode(f).unwrap())
            .collect();
        assert_eq!(
            records,
            vec![(1, 0), (1, 1), (1, 2), (1, 0), (1, 1), (1, 2), (1, 0)]
        );
    }

    #[test]
    fn test_spawned_worker_produces_and_terminates() {
        let mut transport = Transport::Queue(QueueTransport::new(2).unwrap());
        let mut source = RangeSource::new(10, 13);

        let mut handle = spawn(&mut source, &JsonCodec, &transport).unwrap();
        assert!(handle.is_alive());

        let values: Vec<u64> = (0..6)
            .map(|_| JsonCodec.decode(&transport.recv().unwrap()).unwrap())
            .collect();
        assert_eq!(values, vec![10, 11, 12, 10, 11, 12]);

        let pid = handle.pid();
        handle.terminate();
        handle.terminate();
        assert!(!handle.is_alive());
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }

    #[test]
    fn test_terminate_already_exited_worker() {
        // SAFETY: the child exits immediately without touching shared state.
        let pid = match unsafe { fork() }.unwrap() {
            ForkResult::Parent { child } => child,
            ForkResult::Child => unsafe { libc::_exit(0) },
        };
        std::thread::sleep(Duration::from_millis(50));

        let mut handle = WorkerHandle::new(pid);
        handle.terminate();
        assert!(!handle.is_alive());
    }
}
