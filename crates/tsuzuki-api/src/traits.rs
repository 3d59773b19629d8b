//! Trait definitions for anime stream sources.
//!
//! Every backend (AnimeciX, OpenAnime) implements [`AnimeSource`] and maps its
//! own wire payloads into the canonical model below, so the session layer never
//! sees source-specific JSON.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// A unified anime stream source interface.
pub trait AnimeSource: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> SourceKind;

    /// Whether episodes come in several fansub variants.
    fn supports_fansubs(&self) -> bool {
        false
    }

    /// Search for series by title.
    fn search(&self, query: &str)
        -> impl Future<Output = Result<Vec<Series>, SourceError>> + Send;

    /// Look up a single series, e.g. to reopen it from watch history.
    fn series(&self, id: &SeriesRef) -> impl Future<Output = Result<Series, SourceError>> + Send;

    /// List the seasons of a series.
    fn seasons(
        &self,
        series: &SeriesRef,
    ) -> impl Future<Output = Result<Vec<SeasonInfo>, SourceError>> + Send;

    /// List every episode of a series, ordered by season then episode.
    fn episodes(
        &self,
        series: &SeriesRef,
    ) -> impl Future<Output = Result<Vec<Episode>, SourceError>> + Send;

    /// Fetch the streams of one episode by its opaque locator.
    fn episode_streams(
        &self,
        episode: &Episode,
    ) -> impl Future<Output = Result<StreamSet, SourceError>> + Send;

    /// Fetch the streams of a movie.
    fn movie_streams(
        &self,
        series: &SeriesRef,
    ) -> impl Future<Output = Result<StreamSet, SourceError>> + Send;

    /// Fetch a subtitle track for an episode addressed by its zero-based season
    /// index and its zero-based offset within that season.
    fn season_subtitle(
        &self,
        _series: &SeriesRef,
        _season_index: usize,
        _episode_offset: usize,
    ) -> impl Future<Output = Result<Option<String>, SourceError>> + Send {
        async { Ok(None) }
    }

    /// Every fansub release of an episode with its streams, in one fetch.
    fn fansub_catalog(
        &self,
        _series: &SeriesRef,
        _episode: &Episode,
    ) -> impl Future<Output = Result<FansubCatalog, SourceError>> + Send {
        let kind = self.kind();
        async move {
            Err(SourceError::Unsupported {
                kind,
                operation: "fansub catalog",
            })
        }
    }
}

/// The interchangeable backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    AnimeCix,
    OpenAnime,
}

impl SourceKind {
    pub const ALL: &[SourceKind] = &[Self::OpenAnime, Self::AnimeCix];

    /// Stable lowercase key, used for history and presence assets.
    pub fn key(self) -> &'static str {
        match self {
            Self::AnimeCix => "animecix",
            Self::OpenAnime => "openanime",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnimeCix => write!(f, "AnimeciX"),
            Self::OpenAnime => write!(f, "OpenAnime"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "animecix" => Ok(Self::AnimeCix),
            "openanime" => Ok(Self::OpenAnime),
            other => Err(SourceError::UnknownSource(other.to_string())),
        }
    }
}

/// Source-dependent series identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesRef {
    Id(u64),
    Slug(String),
}

impl SeriesRef {
    /// Parse a stored identifier: all-digit strings become numeric ids.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<u64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Slug(raw.to_string()),
        }
    }
}

impl fmt::Display for SeriesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Slug(slug) => f.write_str(slug),
        }
    }
}

/// A series (or movie) as returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesRef,
    pub name: String,
    pub poster_url: Option<String>,
    pub is_movie: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonInfo {
    /// 1-based season number.
    pub number: u32,
    pub name: Option<String>,
    pub is_movie: bool,
}

/// Episode number; specials may be fractional (e.g. `7.5`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeNumber(pub f64);

impl EpisodeNumber {
    pub fn is_whole(self) -> bool {
        self.0.fract() == 0.0
    }
}

impl fmt::Display for EpisodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole() {
            write!(f, "{}", self.0 as i64)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Source-specific episode fields, resolved once when episodes are ingested.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum EpisodeExtra {
    /// The canonical fields are all the source needs.
    #[default]
    None,
    /// The source addresses streams by its own season/episode numbering,
    /// which can differ from the display numbering.
    SeasonNumbered {
        season_num: u32,
        episode_num: EpisodeNumber,
    },
}

/// One episode of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    /// 1-based season number.
    pub season: u32,
    pub number: EpisodeNumber,
    /// Opaque per-source handle used to request streams.
    pub locator: String,
    pub extra: EpisodeExtra,
}

impl Episode {
    /// Zero-based season index.
    pub fn season_index(&self) -> usize {
        self.season.saturating_sub(1) as usize
    }

    /// The synthetic single episode standing in for a movie.
    pub fn movie(title: &str) -> Self {
        Self {
            title: title.to_string(),
            season: 1,
            number: EpisodeNumber(1.0),
            locator: String::new(),
            extra: EpisodeExtra::None,
        }
    }
}

/// A fansub (release group) variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fansub {
    pub id: String,
    pub name: String,
}

/// One fansub's release of an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FansubRelease {
    pub fansub: Fansub,
    pub streams: StreamSet,
}

/// All releases of one episode, in source order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FansubCatalog {
    pub releases: Vec<FansubRelease>,
}

impl FansubCatalog {
    pub fn fansubs(&self) -> Vec<Fansub> {
        self.releases.iter().map(|r| r.fansub.clone()).collect()
    }

    pub fn get(&self, index: usize) -> Option<&FansubRelease> {
        self.releases.get(index)
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}

/// A single quality option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub label: String,
    pub url: String,
}

impl Stream {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Raw stream list for one episode or movie, in source order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamSet {
    pub streams: Vec<Stream>,
    pub subtitle_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("AnimeciX".parse::<SourceKind>().unwrap(), SourceKind::AnimeCix);
        assert_eq!(" openanime ".parse::<SourceKind>().unwrap(), SourceKind::OpenAnime);
        assert!("crunchyroll".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_series_ref_parse() {
        assert_eq!(SeriesRef::parse("1234"), SeriesRef::Id(1234));
        assert_eq!(
            SeriesRef::parse("sousou-no-frieren"),
            SeriesRef::Slug("sousou-no-frieren".into())
        );
        assert_eq!(SeriesRef::Id(42).to_string(), "42");
    }

    #[test]
    fn test_episode_number_display() {
        assert_eq!(EpisodeNumber(7.0).to_string(), "7");
        assert_eq!(EpisodeNumber(7.5).to_string(), "7.5");
        assert!(EpisodeNumber(7.5) > EpisodeNumber(7.0));
    }

    #[test]
    fn test_season_index_is_zero_based() {
        let mut ep = Episode::movie("Akira");
        assert_eq!(ep.season_index(), 0);
        ep.season = 3;
        assert_eq!(ep.season_index(), 2);
    }
}
