//! Construction-time configuration for a prefetching coordinator.
//!
//! Configuration is layered the usual way:
//!
//! 1. Hardcoded defaults (lowest priority)
//! 2. An optional TOML file
//! 3. Environment variables (`PREFETCH_*` prefix)
//! 4. Explicit builder calls (highest priority, applied by the caller)
//!
//! ```toml
//! workers = 4
//! buffer_depth = 5
//! send_hwm = 1
//! transport = "message"
//! pipe_dir = "/tmp"
//! ```

use crate::error::{PrefetchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};


/// Largest queue capacity the pipe-backed queue can pre-allocate slots for.
pub const MAX_QUEUE_CAPACITY: usize = 65536;

/// Which transport carries records from workers to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Single bounded FIFO shared by every worker.
    #[default]
    Queue,
    /// Push/pull messaging over a Unix domain socket with high-water marks.
    Message,
}

impl std::str::FromStr for TransportKind {
    type Err = PrefetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(TransportKind::Queue),
            "message" | "ipc" => Ok(TransportKind::Message),
            other => Err(PrefetchError::Config(format!(
                "unknown transport '{}': expected 'queue' or 'message'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Queue => write!(f, "queue"),
            TransportKind::Message => write!(f, "message"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Number of replicated worker processes.
    pub workers: usize,

    /// Queue capacity, or the receive high-water mark of the message transport.
    pub buffer_depth: usize,

    /// Unacknowledged messages a single pusher may have in flight.
    pub send_hwm: usize,

    pub transport: TransportKind,

    /// Directory where message transport sockets are created. Must be local.
    pub pipe_dir: PathBuf,

    /// Block interrupt signals in the spawning thread while workers fork.
    pub mask_signals: bool,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            buffer_depth: 5,
            send_hwm: 1,
            transport: TransportKind::default(),
            pipe_dir: PathBuf::from("."),
            mask_signals: true,
        }
    }
}

impl PrefetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(workers: usize, buffer_depth: usize) -> Self {
        Self {
            workers,
            buffer_depth,
            transport: TransportKind::Queue,
            ..Self::default()
        }
    }

    pub fn message(workers: usize, pipe_dir: impl Into<PathBuf>) -> Self {
        Self {
            workers,
            transport: TransportKind::Message,
            pipe_dir: pipe_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_buffer_depth(mut self, buffer_depth: usize) -> Self {
        self.buffer_depth = buffer_depth;
        self
    }

    pub fn with_send_hwm(mut self, send_hwm: usize) -> Self {
        self.send_hwm = send_hwm;
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_pipe_dir(mut self, pipe_dir: impl Into<PathBuf>) -> Self {
        self.pipe_dir = pipe_dir.into();
        self
    }

    pub fn with_mask_signals(mut self, mask_signals: bool) -> Self {
        self.mask_signals = mask_signals;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                tracing::debug!("Loaded prefetch configuration from {}", path.display());
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.merge_env_vars();
        Ok(config)
    }

    pub fn merge_env_vars(&mut self) {
        if let Some(workers) = parse_env::<usize>("PREFETCH_WORKERS") {
            self.workers = workers;
        }

        if let Some(depth) = parse_env::<usize>("PREFETCH_BUFFER_DEPTH") {
            self.buffer_depth = depth;
        }

        if let Some(hwm) = parse_env::<usize>("PREFETCH_SEND_HWM") {
            self.send_hwm = hwm;
        }

        if let Some(transport) = parse_env::<TransportKind>("PREFETCH_TRANSPORT") {
            self.transport = transport;
        }

        if let Ok(dir) = std::env::var("PREFETCH_PIPE_DIR") {
            self.pipe_dir = PathBuf::from(dir);
        }

        if let Some(mask) = parse_env::<bool>("PREFETCH_MASK_SIGNALS") {
            self.mask_signals = mask;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PrefetchError::Config(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.buffer_depth == 0 {
            return Err(PrefetchError::Config(
                "buffer_depth must be at least 1".to_string(),
            ));
        }
        if self.send_hwm == 0 {
            return Err(PrefetchError::Config(
                "send_hwm must be at least 1".to_string(),
            ));
        }
        if self.transport == TransportKind::Queue && self.buffer_depth > MAX_QUEUE_CAPACITY {
            return Err(PrefetchError::Config(format!(
                "buffer_depth {} exceeds the queue limit of {}",
                self.buffer_depth, MAX_QUEUE_CAPACITY
            )));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PrefetchError::Config(format!("failed to render configuration: {}", e)))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}
