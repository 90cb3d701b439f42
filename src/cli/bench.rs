use super::args::{BenchArgs, SourceKind};
use super::DEFAULT_UNSIZED_RECORDS;
use crate::config::PrefetchConfig;
use crate::coordinator::Coordinator;
use crate::source::{RandomSource, RangeSource, SourcePipeline};
use crate::speed::{SpeedReport, SpeedTest};
use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DEFAULT_RANGE_COUNT: usize = 1000;

pub fn run_bench(args: &BenchArgs) -> Result<SpeedReport> {
    let config = args
        .config
        .resolve()
        .context("Invalid prefetch configuration")?;

    match args.source {
        SourceKind::Range => {
            let count = args.count.unwrap_or(DEFAULT_RANGE_COUNT) as u64;
            bench_source(RangeSource::new(0, count), config, args)
        }
        SourceKind::Random => bench_source(RandomSource::new(args.count), config, args),
    }
}

fn bench_source<P: SourcePipeline>(
    source: P,
    config: PrefetchConfig,
    args: &BenchArgs,
) -> Result<SpeedReport> {
    tracing::info!(
        "Benchmarking {:?} source with {} worker(s) over the {} transport",
        args.source,
        config.workers,
        config.transport
    );

    let mut coordinator =
        Coordinator::spawn(source, config).context("Failed to start prefetch workers")?;

    // Registered after the fork so workers keep the default dispositions.
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .context("Failed to install signal handler")?;
    }

    let records = args
        .records
        .or(coordinator.count().limit())
        .unwrap_or(DEFAULT_UNSIZED_RECORDS);
    let test = SpeedTest::new(records).with_progress(args.progress);

    let report = test.run_until(
        std::iter::repeat_with(|| coordinator.next_record()),
        || stop.load(Ordering::Relaxed),
    );
    coordinator.close();

    if stop.load(Ordering::Relaxed) {
        tracing::info!("Interrupted; workers released");
    }
    report.context("Failed to pull records from workers")
}
