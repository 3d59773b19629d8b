use thiserror::Error;

use tsuzuki_api::SourceError;
use tsuzuki_core::{ConfigError, HistoryError, PresenceError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error("prompt failed: {0}")]
    Prompt(#[from] inquire::InquireError),
}
