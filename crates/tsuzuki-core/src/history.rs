//! Watch history: a JSON document keyed by source, then series name.
//!
//! ```json
//! { "openanime": { "Frieren": { "lastEpisodeIdx": 4, "lastEpisodeName": "...",
//!                               "seriesId": "frieren", "lastWatchedAt": "2026-..." } } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tsuzuki_api::SourceKind;

use crate::error::HistoryError;

/// Last finished episode of one series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub last_episode_idx: Option<usize>,
    #[serde(default)]
    pub last_episode_name: String,
    #[serde(alias = "animeId")]
    pub series_id: Option<String>,
    #[serde(alias = "lastWatched")]
    pub last_watched_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn new(episode_idx: usize, episode_name: &str, series_id: &str) -> Self {
        Self {
            last_episode_idx: Some(episode_idx),
            last_episode_name: episode_name.to_string(),
            series_id: Some(series_id.to_string()),
            last_watched_at: Some(Utc::now()),
        }
    }

    fn is_complete(&self) -> bool {
        self.last_episode_idx.is_some() && self.series_id.is_some() && self.last_watched_at.is_some()
    }
}

/// A history entry together with the series it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentEntry {
    pub series_name: String,
    pub entry: HistoryEntry,
}

type Document = BTreeMap<String, BTreeMap<String, HistoryEntry>>;

/// Where finished episodes are read from and recorded to.
pub trait WatchHistory: Send + Sync {
    /// Index of the last finished episode of a series, if any.
    fn last_finished(&self, source: SourceKind, series_name: &str) -> Result<Option<usize>, HistoryError>;

    fn record(&self, source: SourceKind, series_name: &str, entry: HistoryEntry) -> Result<(), HistoryError>;
}

/// File-backed history store. Every operation reads the whole document and
/// writes it back whole.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Document, HistoryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Document::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, doc: &Document) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(doc)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn entry(&self, source: SourceKind, series_name: &str) -> Result<Option<HistoryEntry>, HistoryError> {
        let mut doc = self.read_all()?;
        Ok(doc
            .get_mut(source.key())
            .and_then(|series| series.remove(series_name)))
    }

    /// Complete entries for one source, newest first. A `limit` of 0 keeps all.
    pub fn recent(&self, source: SourceKind, limit: usize) -> Result<Vec<RecentEntry>, HistoryError> {
        let doc = self.read_all()?;
        let mut entries: Vec<RecentEntry> = doc
            .get(source.key())
            .into_iter()
            .flatten()
            .filter(|(_, entry)| entry.is_complete())
            .map(|(name, entry)| RecentEntry {
                series_name: name.clone(),
                entry: entry.clone(),
            })
            .collect();
        entries.sort_by(|a, b| b.entry.last_watched_at.cmp(&a.entry.last_watched_at));
        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

impl WatchHistory for HistoryStore {
    fn last_finished(&self, source: SourceKind, series_name: &str) -> Result<Option<usize>, HistoryError> {
        Ok(self
            .entry(source, series_name)?
            .and_then(|e| e.last_episode_idx))
    }

    fn record(&self, source: SourceKind, series_name: &str, entry: HistoryEntry) -> Result<(), HistoryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut doc = self.read_all()?;
        debug!(source = source.key(), series = series_name, episode = ?entry.last_episode_idx, "recording history");
        doc.entry(source.key().to_string())
            .or_default()
            .insert(series_name.to_string(), entry);
        self.write_all(&doc)?;
        info!(source = source.key(), series = series_name, "history updated");
        Ok(())
    }
}

/// Episode index a new session should start at: `last + 1` when that is a
/// valid index, otherwise the first.
pub fn resume_offset(last_finished: Option<usize>, episode_count: usize) -> usize {
    last_finished
        .and_then(|last| last.checked_add(1))
        .filter(|next| *next < episode_count)
        .unwrap_or(0)
}
