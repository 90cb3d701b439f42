use super::SourcePipeline;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Yields `start..end` on every pass.
#[derive(Debug, Clone)]
pub struct RangeSource {
    start: u64,
    end: u64,
    next: u64,
    report_size: bool,
}

impl RangeSource {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            next: start,
            report_size: true,
        }
    }

    /// Same records, but the size query is unsupported.
    pub fn without_size(start: u64, end: u64) -> Self {
        Self {
            report_size: false,
            ..Self::new(start, end)
        }
    }
}

impl SourcePipeline for RangeSource {
    type Record = u64;

    fn reset_state(&mut self) {
        self.next = self.start;
    }

    fn produce(&mut self) -> Option<u64> {
        if self.next >= self.end {
            self.next = self.start;
            return None;
        }
        let value = self.next;
        self.next += 1;
        Some(value)
    }

    fn size(&self) -> Option<usize> {
        if self.report_size {
            Some(self.end.saturating_sub(self.start) as usize)
        } else {
            None
        }
    }
}

/// Random `u64`s, optionally in passes of a fixed length.
///
/// The generator starts from a fixed seed; `reset_state` reseeds it from the
/// OS so every worker replica draws a different stream.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
    pass_len: Option<usize>,
    emitted: usize,
}

impl RandomSource {
    pub fn new(pass_len: Option<usize>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(0),
            pass_len,
            emitted: 0,
        }
    }
}

impl SourcePipeline for RandomSource {
    type Record = u64;

    fn reset_state(&mut self) {
        self.rng = StdRng::from_os_rng();
        self.emitted = 0;
    }

    fn produce(&mut self) -> Option<u64> {
        if let Some(len) = self.pass_len {
            if self.emitted >= len {
                self.emitted = 0;
                return None;
            }
        }
        self.emitted += 1;
        Some(self.rng.random())
    }

    fn size(&self) -> Option<usize> {
        self.pass_len
    }
}
