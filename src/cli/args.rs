//! CLI argument structures

use crate::config::{PrefetchConfig, TransportKind};
use crate::error::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Prefetch records from replicated pipeline workers
#[derive(Parser)]
#[command(name = "dataflow-prefetch")]
#[command(about = "dataflow-prefetch - Stream records from replicated worker processes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull records from a built-in source through worker processes and report throughput
    #[command(name = "bench")]
    Bench(BenchArgs),

    /// Print the effective configuration as TOML
    #[command(name = "show-config")]
    ShowConfig(ConfigArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Number of worker processes
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Queue capacity, or receive high-water mark for the message transport
    #[arg(short = 'b', long)]
    pub buffer_depth: Option<usize>,

    /// Unacknowledged messages per worker connection (message transport)
    #[arg(long)]
    pub send_hwm: Option<usize>,

    /// Transport between workers and consumer: queue or message
    #[arg(short = 't', long)]
    pub transport: Option<TransportKind>,

    /// Local directory for message transport sockets
    #[arg(long)]
    pub pipe_dir: Option<PathBuf>,

    /// Do not block SIGINT while forking workers
    #[arg(long)]
    pub no_mask_signals: bool,
}

impl ConfigArgs {
    /// File and environment first, then explicit flags on top.
    pub fn resolve(&self) -> Result<PrefetchConfig> {
        let mut config = PrefetchConfig::load(self.config.as_deref())?;

        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(depth) = self.buffer_depth {
            config = config.with_buffer_depth(depth);
        }
        if let Some(hwm) = self.send_hwm {
            config = config.with_send_hwm(hwm);
        }
        if let Some(transport) = self.transport {
            config = config.with_transport(transport);
        }
        if let Some(dir) = &self.pipe_dir {
            config = config.with_pipe_dir(dir);
        }
        if self.no_mask_signals {
            config = config.with_mask_signals(false);
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Consecutive integers, one pass per `--count`
    Range,
    /// Random integers, reseeded in every worker
    Random,
}

#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Built-in source to replicate
    #[arg(short = 's', long, value_enum, default_value = "range")]
    pub source: SourceKind,

    /// Records per pass; omit to leave the random source's count unknown
    #[arg(long)]
    pub count: Option<usize>,

    /// Records to pull (default: one epoch, or 1000 when the count is unknown)
    #[arg(short = 'n', long)]
    pub records: Option<usize>,

    /// Show a progress bar while pulling
    #[arg(long)]
    pub progress: bool,
}
