use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    // Configuration errors
    #[error("Extension server '{0}' not found")]
    ConfigNotFound(String),

    #[error("Duplicate extension server id '{0}'")]
    DuplicateId(String),

    #[error("Invalid extension server configuration: {0}")]
    InvalidConfig(String),

    // Persistence errors
    #[error("Failed to persist configuration to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialization(#[from] serde_json::Error),

    // Process lifecycle errors
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: nix::sys::signal::Signal,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("Extension server '{0}' could not be stopped")]
    StopFailed(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
