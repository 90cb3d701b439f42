//! Throughput measurement for record streams.

use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedReport {
    pub records: usize,
    pub elapsed: Duration,
}

impl SpeedReport {
    pub fn records_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.records as f64 / secs
    }
}

impl std::fmt::Display for SpeedReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records in {:.3}s ({:.1} records/s)",
            self.records,
            self.elapsed.as_secs_f64(),
            self.records_per_sec()
        )
    }
}

/// Pulls a fixed number of records and times it.
pub struct SpeedTest {
    records: usize,
    progress: bool,
}

impl SpeedTest {
    pub fn new(records: usize) -> Self {
        Self {
            records,
            progress: false,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Consume up to `records` items. A shorter stream ends the test early;
    /// a failed item aborts it.
    pub fn run<T, I>(&self, stream: I) -> Result<SpeedReport>
    where
        I: IntoIterator<Item = Result<T>>,
    {
        self.run_until(stream, || false)
    }

    /// Like [`SpeedTest::run`], but also stops once `stop` returns true.
    pub fn run_until<T, I, F>(&self, stream: I, stop: F) -> Result<SpeedReport>
    where
        I: IntoIterator<Item = Result<T>>,
        F: Fn() -> bool,
    {
        let bar = self.progress_bar();
        let started = Instant::now();
        let mut records = 0;

        for item in stream.into_iter().take(self.records) {
            if stop() {
                break;
            }
            if let Err(e) = item {
                bar.abandon_with_message("failed");
                return Err(e);
            }
            records += 1;
            bar.inc(1);
        }

        let report = SpeedReport {
            records,
            elapsed: started.elapsed(),
        };
        bar.finish_and_clear();
        tracing::debug!("Speed test finished: {}", report);
        Ok(report)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(self.records as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    }
}

impl Default for SpeedTest {
    fn default() -> Self {
        Self::new(5000)
    }
}
