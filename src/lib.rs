//! # dataflow-prefetch
//!
//! Runs a slow, stateful record pipeline in several worker processes and
//! streams their output to one consumer through a bounded channel.
//!
//! ## Modules
//!
//! - `source` - The pipeline trait workers replicate, plus built-in sources
//! - `codec` - Record serialization and framing between processes
//! - `transport` - Bounded queue and push/pull message transports
//! - `worker` - Forked worker processes and their termination
//! - `coordinator` - Owns workers and transport, exposes the record stream
//! - `config` - Construction-time configuration (TOML + environment)
//! - `speed` - Throughput measurement for record streams
//! - `cli` - The `dataflow-prefetch` command-line tool
pub mod cli;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod source;
pub mod speed;
pub mod transport;
pub mod worker;

pub use codec::{Codec, JsonCodec};
pub use config::{PrefetchConfig, TransportKind};
pub use coordinator::{Coordinator, LifecycleState, Records};
pub use error::{PrefetchError, Result};
pub use source::{Count, RandomSource, RangeSource, SourcePipeline};
pub use speed::{SpeedReport, SpeedTest};
