use serde::Deserialize;

use crate::traits::{Episode, EpisodeExtra, EpisodeNumber, SeasonInfo, Series, SeriesRef, Stream};

// ── Catalogue responses ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<CixTitleSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CixTitleSummary {
    pub id: u64,
    pub name: String,
    pub title_type: Option<String>,
    pub poster: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TitleResponse {
    pub title: CixTitle,
}

#[derive(Debug, Deserialize)]
pub struct CixTitle {
    pub id: u64,
    pub name: String,
    pub title_type: Option<String>,
    pub poster: Option<String>,
    pub season_count: Option<u32>,
    #[serde(default)]
    pub seasons: Vec<CixSeason>,
    #[serde(default)]
    pub videos: Vec<CixVideo>,
}

#[derive(Debug, Deserialize)]
pub struct CixSeason {
    pub number: u32,
    pub name: Option<String>,
    #[serde(default)]
    pub episodes: Vec<CixSeasonEpisode>,
}

#[derive(Debug, Deserialize)]
pub struct CixSeasonEpisode {
    #[serde(default)]
    pub videos: Vec<CixVideo>,
}

#[derive(Debug, Deserialize)]
pub struct CixVideo {
    pub url: String,
    #[serde(default)]
    pub captions: Vec<CixCaption>,
}

#[derive(Debug, Deserialize)]
pub struct CixCaption {
    pub language: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct RelatedVideosResponse {
    #[serde(default)]
    pub videos: Vec<CixEpisode>,
}

#[derive(Debug, Deserialize)]
pub struct CixEpisode {
    pub name: String,
    pub url: String,
    pub season_num: f64,
    pub episode_num: f64,
}

// ── Video host responses ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VideoHostResponse {
    #[serde(default)]
    pub urls: Vec<VideoHostStream>,
}

#[derive(Debug, Deserialize)]
pub struct VideoHostStream {
    pub label: String,
    pub url: String,
}

// ── Conversions ──────────────────────────────────────────────────

fn is_movie(title_type: Option<&str>) -> bool {
    title_type.is_some_and(|t| t.eq_ignore_ascii_case("movie"))
}

impl CixTitleSummary {
    pub fn into_series(self) -> Series {
        let is_movie = is_movie(self.title_type.as_deref());
        Series {
            id: SeriesRef::Id(self.id),
            name: self.name,
            poster_url: self.poster,
            is_movie,
        }
    }
}

impl CixTitle {
    pub fn to_series(&self) -> Series {
        Series {
            id: SeriesRef::Id(self.id),
            name: self.name.clone(),
            poster_url: self.poster.clone(),
            is_movie: is_movie(self.title_type.as_deref()),
        }
    }

    /// Season list, falling back to `season_count` when the title omits details.
    pub fn season_infos(&self) -> Vec<SeasonInfo> {
        let is_movie = is_movie(self.title_type.as_deref());
        if !self.seasons.is_empty() {
            return self
                .seasons
                .iter()
                .map(|s| SeasonInfo {
                    number: s.number,
                    name: s.name.clone(),
                    is_movie,
                })
                .collect();
        }
        (1..=self.season_count.unwrap_or(1))
            .map(|number| SeasonInfo {
                number,
                name: None,
                is_movie,
            })
            .collect()
    }
}

impl CixEpisode {
    pub fn into_episode(self) -> Episode {
        Episode {
            title: self.name,
            season: self.season_num.max(1.0) as u32,
            number: EpisodeNumber(self.episode_num),
            locator: self.url,
            extra: EpisodeExtra::None,
        }
    }
}

impl From<VideoHostStream> for Stream {
    fn from(s: VideoHostStream) -> Self {
        Stream::new(s.label, s.url)
    }
}

/// First caption in the requested language.
pub fn caption_for<'a>(captions: &'a [CixCaption], language: &str) -> Option<&'a str> {
    captions
        .iter()
        .find(|c| c.language.eq_ignore_ascii_case(language))
        .map(|c| c.url.as_str())
}
