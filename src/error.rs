use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrefetchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Endpoint directory {path:?} is unusable: {reason}")]
    EndpointDirectory { path: PathBuf, reason: String },

    #[error("Endpoint address {0:?} exceeds the Unix socket path limit")]
    EndpointPathTooLong(PathBuf),

    #[error("Failed to bind endpoint {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn worker process: {0}")]
    Spawn(#[source] nix::Error),

    #[error("Failed to change signal mask: {0}")]
    SignalMask(#[source] nix::Error),

    #[error("Transport disconnected")]
    Disconnected,

    #[error("Coordinator has not been started")]
    NotStarted,

    #[error("Coordinator has already been started")]
    AlreadyStarted,

    #[error("Coordinator is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PrefetchError>;
