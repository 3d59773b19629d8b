use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tsuzuki_api::{SourceKind, SourceUrls};
use tsuzuki_player::LivenessPolicy;

use crate::error::ConfigError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub player: PlayerConfig,
    pub discord: DiscordConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub default_source: String,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub binary: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub liveness_attempts: u32,
    pub liveness_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub app_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub animecix_url: String,
    pub openanime_url: String,
}

impl AppConfig {
    /// Load the user file if present, otherwise the built-in defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            let user_str = std::fs::read_to_string(&user_path)?;
            Self::parse(&user_str)
        } else {
            Self::parse(DEFAULT_CONFIG)
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.default_source()?;
        Ok(config)
    }

    pub fn default_source(&self) -> Result<SourceKind, ConfigError> {
        self.general
            .default_source
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown source {:?}", self.general.default_source)))
    }

    pub fn source_urls(&self) -> SourceUrls {
        SourceUrls {
            animecix: self.sources.animecix_url.clone(),
            openanime: self.sources.openanime_url.clone(),
        }
    }

    pub fn liveness(&self) -> LivenessPolicy {
        LivenessPolicy {
            attempts: self.player.liveness_attempts.max(1),
            interval: Duration::from_millis(self.player.liveness_interval_ms),
        }
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the watch history JSON document.
    pub fn history_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("history.json"))
            .unwrap_or_else(|| PathBuf::from("history.json"))
    }

    /// Directory for log files.
    pub fn log_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "tsuzuki")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.default_source().unwrap(), SourceKind::OpenAnime);
        assert_eq!(config.player.binary, "mpv");
        assert!(config.discord.enabled);
        assert_eq!(config.general.history_limit, 20);

        let policy = config.liveness();
        assert_eq!(policy.attempts, 10);
        assert_eq!(policy.interval, Duration::from_millis(300));
    }

    #[test]
    fn test_unknown_default_source_rejected() {
        let raw = DEFAULT_CONFIG.replace("\"openanime\"", "\"crunchyroll\"");
        assert!(matches!(AppConfig::parse(&raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized = AppConfig::parse(&serialized).unwrap();
        assert_eq!(deserialized.sources.animecix_url, config.sources.animecix_url);
        assert_eq!(deserialized.player.extra_args, config.player.extra_args);
    }
}
