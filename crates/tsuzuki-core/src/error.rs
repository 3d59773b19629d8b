use thiserror::Error;

use tsuzuki_api::{SourceError, SourceKind};
use tsuzuki_player::PlayerError;

/// A user selection that cannot be applied; session state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("episode {index} is out of range (0..{len})")]
    EpisodeOutOfRange { index: usize, len: usize },

    #[error("fansub {index} is out of range (0..{len})")]
    FansubOutOfRange { index: usize, len: usize },

    #[error("{0} does not offer fansub choices")]
    FansubsUnsupported(SourceKind),

    #[error("no stream labelled {0:?}")]
    UnknownResolution(String),

    #[error("source switch is only possible while browsing")]
    NotBrowsing,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("no streams available")]
    NoStreams,

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("fetch failed: {0}")]
    TransientFetch(#[from] SourceError),

    #[error("invalid selection: {0}")]
    InvalidSelection(#[from] SelectionError),

    #[error("no streams available")]
    NoStreams,

    #[error("player failed: {0}")]
    LaunchFailure(#[from] PlayerError),

    #[error("session already exited")]
    Closed,
}

impl From<NormalizeError> for SessionError {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::Source(e) => Self::TransientFetch(e),
            NormalizeError::NoStreams => Self::NoStreams,
            NormalizeError::Selection(e) => Self::InvalidSelection(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("presence client unavailable: {0}")]
    Unavailable(String),

    #[error("presence update failed: {0}")]
    Update(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}
