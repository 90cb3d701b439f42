use crate::error::{PrefetchError, Result};
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};

/// Blocks `SIGINT` in the calling thread until dropped.
///
/// Processes forked while the guard is alive inherit the blocked mask, so a
/// terminal interrupt reaches the coordinator but not its workers. `SIGTERM`
/// stays deliverable because it is how workers get terminated.
pub struct InterruptMask {
    previous: SigSet,
}

impl InterruptMask {
    pub fn block() -> Result<Self> {
        let mut interrupts = SigSet::empty();
        interrupts.add(Signal::SIGINT);

        let mut previous = SigSet::empty();
        pthread_sigmask(
            SigmaskHow::SIG_BLOCK,
            Some(&interrupts),
            Some(&mut previous),
        )
        .map_err(PrefetchError::SignalMask)?;

        Ok(Self { previous })
    }
}

impl Drop for InterruptMask {
    fn drop(&mut self) {
        if let Err(e) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            tracing::warn!("Failed to restore signal mask: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_mask() -> SigSet {
        let mut mask = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, None, Some(&mut mask)).unwrap();
        mask
    }

    #[test]
    fn test_mask_blocks_and_restores() {
        // Runs on its own test thread, so the mask changes stay local.
        assert!(!current_mask().contains(Signal::SIGINT));
        {
            let _mask = InterruptMask::block().unwrap();
            let mask = current_mask();
            assert!(mask.contains(Signal::SIGINT));
            assert!(!mask.contains(Signal::SIGTERM));
        }
        assert!(!current_mask().contains(Signal::SIGINT));
    }
}
