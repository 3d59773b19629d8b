pub mod config;
pub mod error;
pub mod history;
pub mod normalize;
pub mod pollers;
pub mod presence;
pub mod session;

pub use config::AppConfig;
pub use error::{ConfigError, HistoryError, NormalizeError, PresenceError, SelectionError, SessionError};
pub use history::{HistoryEntry, HistoryStore, RecentEntry, WatchHistory};
pub use normalize::QualityLadder;
pub use presence::{PresenceSink, PresenceStatus};
pub use session::{Boundary, Command, Session, SessionEnv, SessionState, UiHint};
