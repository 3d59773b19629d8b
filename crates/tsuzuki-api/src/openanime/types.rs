use serde::Deserialize;

use crate::traits::{
    Episode, EpisodeExtra, EpisodeNumber, Fansub, FansubCatalog, FansubRelease, SeasonInfo, Series,
    SeriesRef, Stream, StreamSet,
};

// ── Catalogue responses ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OaAnime {
    pub slug: String,
    pub english: Option<String>,
    pub turkish: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub pictures: Option<OaPictures>,
    #[serde(default)]
    pub seasons: Vec<OaSeason>,
}

#[derive(Debug, Deserialize)]
pub struct OaPictures {
    pub avatar: Option<String>,
    pub banner: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OaSeason {
    pub season_number: u32,
    pub name: Option<String>,
    #[serde(default)]
    pub has_movie: bool,
}

#[derive(Debug, Deserialize)]
pub struct OaSeasonResponse {
    #[serde(default)]
    pub episodes: Vec<OaEpisode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OaEpisode {
    pub episode_number: f64,
    pub name: Option<String>,
}

// ── Watch responses ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OaWatchResponse {
    #[serde(default)]
    pub fansubs: Vec<OaFansub>,
    #[serde(default)]
    pub files: Vec<OaFile>,
}

#[derive(Debug, Deserialize)]
pub struct OaFansub {
    pub id: String,
    pub name: String,
    #[serde(rename = "trCaption")]
    pub tr_caption: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OaFile {
    pub fansub_id: String,
    pub resolution: u32,
    pub file: String,
}

// ── Conversions ──────────────────────────────────────────────────

impl OaAnime {
    pub fn display_name(&self) -> String {
        self.turkish
            .as_deref()
            .or(self.english.as_deref())
            .unwrap_or(&self.slug)
            .to_string()
    }

    pub fn is_movie(&self) -> bool {
        self.type_
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("movie"))
            || self.seasons.first().is_some_and(|s| s.has_movie)
    }

    pub fn to_series(&self) -> Series {
        Series {
            id: SeriesRef::Slug(self.slug.clone()),
            name: self.display_name(),
            poster_url: self.pictures.as_ref().and_then(|p| p.avatar.clone()),
            is_movie: self.is_movie(),
        }
    }

    pub fn season_infos(&self) -> Vec<SeasonInfo> {
        let movie_type = self
            .type_
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("movie"));
        self.seasons
            .iter()
            .map(|s| SeasonInfo {
                number: s.season_number,
                name: s.name.clone(),
                is_movie: movie_type || s.has_movie,
            })
            .collect()
    }
}

impl OaEpisode {
    pub fn into_episode(self, slug: &str, season: u32) -> Episode {
        let number = EpisodeNumber(self.episode_number);
        let title = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{season}. Sezon, {number}. Bölüm"));
        Episode {
            title,
            season,
            number,
            locator: format!("{slug}/season/{season}/episode/{number}"),
            extra: EpisodeExtra::SeasonNumbered {
                season_num: season,
                episode_num: number,
            },
        }
    }
}

impl From<&OaFansub> for Fansub {
    fn from(f: &OaFansub) -> Self {
        Fansub {
            id: f.id.clone(),
            name: f.name.clone(),
        }
    }
}

impl OaWatchResponse {
    /// Every fansub with its own streams, from this one payload.
    pub fn catalog(&self) -> FansubCatalog {
        FansubCatalog {
            releases: self
                .fansubs
                .iter()
                .map(|f| FansubRelease {
                    fansub: Fansub::from(f),
                    streams: self.streams_for(&f.id),
                })
                .collect(),
        }
    }

    /// Streams released by one fansub, in response order.
    pub fn streams_for(&self, fansub_id: &str) -> StreamSet {
        let streams = self
            .files
            .iter()
            .filter(|f| f.fansub_id == fansub_id)
            .map(|f| Stream::new(format!("{}p", f.resolution), f.file.clone()))
            .collect();
        let subtitle_url = self
            .fansubs
            .iter()
            .find(|f| f.id == fansub_id)
            .and_then(|f| f.tr_caption.clone());
        StreamSet {
            streams,
            subtitle_url,
        }
    }
}
