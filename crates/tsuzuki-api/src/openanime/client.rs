use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::types::{OaAnime, OaSeasonResponse, OaWatchResponse};
use crate::error::SourceError;
use crate::traits::{
    AnimeSource, Episode, EpisodeExtra, FansubCatalog, SeasonInfo, Series, SeriesRef, SourceKind,
    StreamSet,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openani.me/";

/// OpenAnime REST client.
#[derive(Debug, Clone)]
pub struct OpenAnimeClient {
    http: Client,
    base: Url,
}

impl OpenAnimeClient {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| SourceError::Parse(format!("bad base url {base_url}: {e}")))?;
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| SourceError::Parse(format!("bad endpoint {path}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        debug!(%url, "openanime request");
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        resp.json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }

    async fn anime(&self, slug: &str) -> Result<OaAnime, SourceError> {
        let url = self.endpoint(&format!("anime/{slug}"))?;
        self.get_json(url).await
    }

    /// Watch payload for one episode, addressed by the source's own numbering.
    async fn watch(&self, slug: &str, episode: &Episode) -> Result<OaWatchResponse, SourceError> {
        let (season, number) = match &episode.extra {
            EpisodeExtra::SeasonNumbered {
                season_num,
                episode_num,
            } => (*season_num, *episode_num),
            EpisodeExtra::None => (episode.season, episode.number),
        };
        let url = self.endpoint(&format!("anime/{slug}/season/{season}/episode/{number}"))?;
        self.get_json(url).await
    }

    async fn movie_watch(&self, slug: &str) -> Result<OaWatchResponse, SourceError> {
        let url = self.endpoint(&format!("anime/{slug}/movie"))?;
        self.get_json(url).await
    }
}

fn slug(id: &SeriesRef) -> Result<&str, SourceError> {
    match id {
        SeriesRef::Slug(slug) => Ok(slug),
        SeriesRef::Id(id) => Err(SourceError::Parse(format!(
            "openanime expects a slug, got numeric id {id}"
        ))),
    }
}

/// Locator form `"<slug>/season/<n>/episode/<m>"` carries the slug.
fn slug_from_locator(locator: &str) -> Result<&str, SourceError> {
    locator
        .split_once("/season/")
        .map(|(slug, _)| slug)
        .filter(|slug| !slug.is_empty())
        .ok_or_else(|| SourceError::Parse(format!("bad openanime locator {locator:?}")))
}

impl AnimeSource for OpenAnimeClient {
    fn kind(&self) -> SourceKind {
        SourceKind::OpenAnime
    }

    fn supports_fansubs(&self) -> bool {
        true
    }

    async fn search(&self, query: &str) -> Result<Vec<Series>, SourceError> {
        let mut url = self.endpoint("anime/search")?;
        url.query_pairs_mut().append_pair("q", query);
        let results: Vec<OaAnime> = self.get_json(url).await?;
        Ok(results.iter().map(OaAnime::to_series).collect())
    }

    async fn series(&self, id: &SeriesRef) -> Result<Series, SourceError> {
        Ok(self.anime(slug(id)?).await?.to_series())
    }

    async fn seasons(&self, series: &SeriesRef) -> Result<Vec<SeasonInfo>, SourceError> {
        Ok(self.anime(slug(series)?).await?.season_infos())
    }

    async fn episodes(&self, series: &SeriesRef) -> Result<Vec<Episode>, SourceError> {
        let slug = slug(series)?;
        let seasons = self.seasons(series).await?;

        let mut episodes = Vec::new();
        for season in seasons {
            let url = self.endpoint(&format!("anime/{slug}/season/{}", season.number))?;
            let body: OaSeasonResponse = self.get_json(url).await?;
            debug!(slug, season = season.number, count = body.episodes.len(), "openanime season episodes");
            episodes.extend(
                body.episodes
                    .into_iter()
                    .map(|e| e.into_episode(slug, season.number)),
            );
        }
        Ok(episodes)
    }

    /// Streams of the first listed fansub.
    async fn episode_streams(&self, episode: &Episode) -> Result<StreamSet, SourceError> {
        let slug = slug_from_locator(&episode.locator)?;
        let watch = self.watch(slug, episode).await?;
        let first = watch
            .fansubs
            .first()
            .ok_or_else(|| SourceError::NotFound(format!("no fansub for {}", episode.locator)))?;
        Ok(watch.streams_for(&first.id))
    }

    async fn movie_streams(&self, series: &SeriesRef) -> Result<StreamSet, SourceError> {
        let watch = self.movie_watch(slug(series)?).await?;
        let first = watch
            .fansubs
            .first()
            .ok_or_else(|| SourceError::NotFound(format!("no fansub for movie {series}")))?;
        Ok(watch.streams_for(&first.id))
    }

    async fn fansub_catalog(
        &self,
        series: &SeriesRef,
        episode: &Episode,
    ) -> Result<FansubCatalog, SourceError> {
        let watch = self.watch(slug(series)?, episode).await?;
        Ok(watch.catalog())
    }
}
