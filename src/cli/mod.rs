//! CLI command handlers
//!
//! - `bench`: replicate a built-in source across workers and measure throughput
//! - `show-config`: print the configuration the other commands would use

pub mod args;
pub mod bench;

pub use args::{BenchArgs, Cli, Commands, ConfigArgs, SourceKind};
pub use bench::run_bench;

use anyhow::{Context, Result};

/// Records pulled by `bench` when the source cannot report its size.
pub const DEFAULT_UNSIZED_RECORDS: usize = 1000;

pub fn get_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

pub fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Bench(args) => {
            let report = run_bench(&args)?;
            println!("{}", report);
            Ok(())
        }
        Commands::ShowConfig(args) => {
            let config = args
                .resolve()
                .context("Failed to resolve prefetch configuration")?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
