use tsuzuki_api::SourceKind;

use crate::error::PresenceError;

/// Fallback large-image asset when the poster is not a usable image URL.
pub const DEFAULT_LARGE_IMAGE: &str = "tsuzuki";

/// One "now playing" update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceStatus {
    pub details: String,
    pub state: String,
    pub large_image: String,
    pub large_text: String,
    pub small_image: String,
    pub small_text: String,
    /// Unix timestamp shown as elapsed time.
    pub started_at: i64,
}

/// Receives presence updates. Connecting, reconnecting and rate limiting are
/// the implementation's business; callers just push the latest status.
pub trait PresenceSink: Send + Sync {
    fn set_status(&self, status: &PresenceStatus) -> Result<(), PresenceError>;

    /// Clear the status and drop the connection.
    fn logout(&self);
}

/// Snapshot of the player used to build a status line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub position: f64,
    pub duration: f64,
    pub paused: bool,
}

impl PresenceStatus {
    pub fn playing(
        series_name: &str,
        poster_url: Option<&str>,
        episode_title: &str,
        source: SourceKind,
        progress: Progress,
        started_at: i64,
    ) -> Self {
        let mut state = format!(
            "{episode_title} ({} / {})",
            format_clock(progress.position),
            format_clock(progress.duration)
        );
        if progress.paused {
            state.push_str(" (Paused)");
        }
        Self {
            details: series_name.to_string(),
            state,
            large_image: large_image(poster_url),
            large_text: series_name.to_string(),
            small_image: source.key().to_string(),
            small_text: source.to_string(),
            started_at,
        }
    }
}

fn large_image(poster_url: Option<&str>) -> String {
    match poster_url {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => url.to_string(),
        _ => DEFAULT_LARGE_IMAGE.to_string(),
    }
}

/// `mm:ss`, or `hh:mm:ss` from one hour on. Rounds to the nearest second.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        (seconds + 0.5) as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(65.4), "01:05");
        assert_eq!(format_clock(65.5), "01:06");
        assert_eq!(format_clock(3599.4), "59:59");
        assert_eq!(format_clock(3600.0), "01:00:00");
        assert_eq!(format_clock(f64::NAN), "00:00");
    }

    #[test]
    fn test_playing_status() {
        let progress = Progress {
            position: 125.0,
            duration: 1420.0,
            paused: true,
        };
        let status = PresenceStatus::playing(
            "Mushishi",
            Some("https://img.example/mushishi.jpg"),
            "3. Bölüm",
            SourceKind::AnimeCix,
            progress,
            1_700_000_000,
        );
        assert_eq!(status.details, "Mushishi");
        assert_eq!(status.state, "3. Bölüm (02:05 / 23:40) (Paused)");
        assert_eq!(status.large_image, "https://img.example/mushishi.jpg");
        assert_eq!(status.small_image, "animecix");
        assert_eq!(status.small_text, "AnimeciX");
    }

    #[test]
    fn test_non_http_poster_uses_default_asset() {
        assert_eq!(large_image(Some("/uploads/poster.jpg")), DEFAULT_LARGE_IMAGE);
        assert_eq!(large_image(None), DEFAULT_LARGE_IMAGE);
    }
}
