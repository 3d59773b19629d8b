use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::types::{
    caption_for, CixEpisode, RelatedVideosResponse, SearchResponse, TitleResponse,
    VideoHostResponse,
};
use crate::error::SourceError;
use crate::traits::{AnimeSource, Episode, SeasonInfo, Series, SeriesRef, SourceKind, StreamSet};

pub const DEFAULT_BASE_URL: &str = "https://animecix.tv/";
const VIDEO_HOST_URL: &str = "https://tau-video.xyz/";
const SUBTITLE_LANGUAGE: &str = "tr";
/// Any existing video id; the related-videos endpoint only uses it as an anchor.
const ANCHOR_VIDEO_ID: &str = "637113";

/// AnimeciX REST client.
#[derive(Debug, Clone)]
pub struct AnimeCixClient {
    http: Client,
    base: Url,
    video_host: Url,
}

impl AnimeCixClient {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            http: Client::new(),
            base: parse_base(base_url)?,
            video_host: parse_base(VIDEO_HOST_URL)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| SourceError::Parse(format!("bad endpoint {path}: {e}")))
    }

    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(SourceError::Api {
                status,
                message: body,
            })
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        debug!(%url, "animecix request");
        let resp = self.http.get(url).send().await?;
        let resp = Self::check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }

    async fn title(&self, id: u64) -> Result<TitleResponse, SourceError> {
        let mut url = self.endpoint(&format!("secure/titles/{id}"))?;
        url.query_pairs_mut().append_pair("titleId", &id.to_string());
        self.get_json(url).await
    }

    async fn season_episodes(&self, id: u64, season: u32) -> Result<Vec<CixEpisode>, SourceError> {
        let mut url = self.endpoint("secure/related-videos")?;
        url.query_pairs_mut()
            .append_pair("episode", "1")
            .append_pair("season", &season.to_string())
            .append_pair("titleId", &id.to_string())
            .append_pair("videoId", ANCHOR_VIDEO_ID);
        let body: RelatedVideosResponse = self.get_json(url).await?;
        Ok(body.videos)
    }

    /// Follow the embed redirect for a video path and read the stream list
    /// from the video host.
    async fn video_streams(&self, video_path: &str) -> Result<StreamSet, SourceError> {
        let embed = self.endpoint(video_path)?;
        let resp = self.http.get(embed).send().await?;
        let resp = Self::check_response(resp).await?;
        let video_id = resp
            .url()
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SourceError::Parse(format!("no video id in {}", resp.url())))?;

        let api = self
            .video_host
            .join(&format!("api/video/{video_id}"))
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        let body: VideoHostResponse = self.get_json(api).await?;
        Ok(StreamSet {
            streams: body.urls.into_iter().map(Into::into).collect(),
            subtitle_url: None,
        })
    }
}

fn parse_base(raw: &str) -> Result<Url, SourceError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| SourceError::Parse(format!("bad base url {raw}: {e}")))
}

fn numeric_id(id: &SeriesRef) -> Result<u64, SourceError> {
    match id {
        SeriesRef::Id(id) => Ok(*id),
        SeriesRef::Slug(slug) => Err(SourceError::Parse(format!(
            "animecix expects a numeric title id, got {slug:?}"
        ))),
    }
}

impl AnimeSource for AnimeCixClient {
    fn kind(&self) -> SourceKind {
        SourceKind::AnimeCix
    }

    async fn search(&self, query: &str) -> Result<Vec<Series>, SourceError> {
        let mut url = self.endpoint("secure/search")?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Parse("base url cannot hold a path".into()))?
            .push(query);
        url.query_pairs_mut()
            .append_pair("type", "")
            .append_pair("limit", "20");
        let body: SearchResponse = self.get_json(url).await?;
        Ok(body
            .results
            .into_iter()
            .map(|r| r.into_series())
            .collect())
    }

    async fn series(&self, id: &SeriesRef) -> Result<Series, SourceError> {
        let resp = self.title(numeric_id(id)?).await?;
        Ok(resp.title.to_series())
    }

    async fn seasons(&self, series: &SeriesRef) -> Result<Vec<SeasonInfo>, SourceError> {
        let resp = self.title(numeric_id(series)?).await?;
        Ok(resp.title.season_infos())
    }

    async fn episodes(&self, series: &SeriesRef) -> Result<Vec<Episode>, SourceError> {
        let id = numeric_id(series)?;
        let seasons = self.seasons(series).await?;

        let mut episodes = Vec::new();
        for season in seasons {
            let batch = self.season_episodes(id, season.number).await?;
            debug!(id, season = season.number, count = batch.len(), "animecix season episodes");
            episodes.extend(batch.into_iter().map(CixEpisode::into_episode));
        }
        Ok(episodes)
    }

    async fn episode_streams(&self, episode: &Episode) -> Result<StreamSet, SourceError> {
        self.video_streams(&episode.locator).await
    }

    async fn movie_streams(&self, series: &SeriesRef) -> Result<StreamSet, SourceError> {
        let resp = self.title(numeric_id(series)?).await?;
        let video = resp
            .title
            .videos
            .first()
            .ok_or_else(|| SourceError::NotFound(format!("no video for title {series}")))?;
        let subtitle_url = caption_for(&video.captions, SUBTITLE_LANGUAGE).map(str::to_string);
        let mut set = self.video_streams(&video.url).await?;
        set.subtitle_url = subtitle_url;
        Ok(set)
    }

    async fn season_subtitle(
        &self,
        series: &SeriesRef,
        season_index: usize,
        episode_offset: usize,
    ) -> Result<Option<String>, SourceError> {
        let resp = self.title(numeric_id(series)?).await?;
        Ok(resp
            .title
            .seasons
            .get(season_index)
            .and_then(|s| s.episodes.get(episode_offset))
            .and_then(|e| e.videos.first())
            .and_then(|v| caption_for(&v.captions, SUBTITLE_LANGUAGE))
            .map(str::to_string))
    }
}
