use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("player rejected command: {0}")]
    Command(String),

    #[error("property {name} has unexpected value {value}")]
    Property {
        name: String,
        value: serde_json::Value,
    },

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("control channel closed")]
    Closed,

    #[error("player not live after {attempts} attempts")]
    NotLive { attempts: u32 },

    #[error("player already exited")]
    AlreadyExited,

    #[error("player control is not supported on this platform")]
    Unsupported,
}
