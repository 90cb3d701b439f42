//! One-shot release of a coordinator's workers and transport.
//!
//! Every teardown path funnels into [`Teardown::release`]: an explicit
//! `close`, `Drop`, and a process-exit hook installed with `atexit` the first
//! time a coordinator is created. The hook holds weak references only and
//! releases coordinators belonging to the exiting process.

use super::LifecycleState;
use crate::transport::TransportContext;
use crate::worker::WorkerHandle;
use nix::unistd::{getpid, Pid};
use once_cell::sync::Lazy;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError, Weak};

static EXIT_HOOKS: Lazy<Mutex<Vec<Weak<Teardown>>>> = Lazy::new(|| Mutex::new(Vec::new()));
static INSTALL_EXIT_HOOK: Once = Once::new();

pub struct Teardown {
    owner: Pid,
    endpoint: String,
    released: AtomicBool,
    state: Mutex<LifecycleState>,
    workers: Mutex<Vec<WorkerHandle>>,
    context: Arc<dyn TransportContext>,
}

impl Teardown {
    pub fn new(context: Arc<dyn TransportContext>, endpoint: String) -> Arc<Self> {
        Arc::new(Self {
            owner: getpid(),
            endpoint,
            released: AtomicBool::new(false),
            state: Mutex::new(LifecycleState::Init),
            workers: Mutex::new(Vec::new()),
            context,
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_running(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == LifecycleState::Init {
            *state = LifecycleState::Running;
        }
    }

    pub fn add_worker(&self, worker: WorkerHandle) {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(worker);
    }

    #[cfg(test)]
    pub fn worker_pids(&self) -> Vec<Pid> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(WorkerHandle::pid)
            .collect()
    }

    #[cfg(test)]
    pub fn live_workers(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
            .map(WorkerHandle::is_alive)
            .filter(|alive| *alive)
            .count()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Destroy the transport, terminate every worker, and mark the coordinator
    /// closed. Only the first call does anything.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        log_quietly(|| tracing::info!("Prefetch workers exiting ({})...", self.endpoint));

        if !self.context.is_destroyed() {
            self.context.destroy();
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.iter_mut() {
            worker.terminate();
        }
        drop(workers);

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = LifecycleState::Closed;

        log_quietly(|| tracing::info!("Prefetch workers exited."));
    }
}

/// Logging may already be torn down when this runs at exit.
fn log_quietly(log: impl FnOnce()) {
    let _ = panic::catch_unwind(AssertUnwindSafe(log));
}

pub fn register_exit_hook(teardown: &Arc<Teardown>) {
    INSTALL_EXIT_HOOK.call_once(|| {
        // SAFETY: `run_exit_hooks` is a plain C-ABI function that never unwinds.
        if unsafe { libc::atexit(run_exit_hooks) } != 0 {
            tracing::warn!("Failed to install prefetch exit hook");
        }
    });

    let mut hooks = EXIT_HOOKS.lock().unwrap_or_else(PoisonError::into_inner);
    hooks.retain(|hook| hook.strong_count() > 0);
    hooks.push(Arc::downgrade(teardown));
}

extern "C" fn run_exit_hooks() {
    let _ = panic::catch_unwind(|| {
        let pending = match EXIT_HOOKS.try_lock() {
            Ok(mut hooks) => std::mem::take(&mut *hooks),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                std::mem::take(&mut *poisoned.into_inner())
            }
            Err(std::sync::TryLockError::WouldBlock) => return,
        };
        release_owned(pending, getpid());
    });
}

/// Release every live teardown in `hooks` that belongs to process `pid`.
fn release_owned(hooks: Vec<Weak<Teardown>>, pid: Pid) -> usize {
    let mut released = 0;
    for teardown in hooks.iter().filter_map(Weak::upgrade) {
        if teardown.owner == pid && !teardown.is_released() {
            teardown.release();
            released += 1;
        }
    }
    released
}
