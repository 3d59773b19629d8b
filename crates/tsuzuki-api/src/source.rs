use crate::animecix::AnimeCixClient;
use crate::error::SourceError;
use crate::openanime::OpenAnimeClient;
use crate::traits::{
    AnimeSource, Episode, FansubCatalog, SeasonInfo, Series, SeriesRef, SourceKind, StreamSet,
};

/// Base URLs for every backend.
#[derive(Debug, Clone)]
pub struct SourceUrls {
    pub animecix: String,
    pub openanime: String,
}

impl Default for SourceUrls {
    fn default() -> Self {
        Self {
            animecix: crate::animecix::DEFAULT_BASE_URL.to_string(),
            openanime: crate::openanime::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Runtime-selected backend. Swapping sources mid-session means replacing
/// this value; callers never depend on a concrete client.
#[derive(Debug, Clone)]
pub enum AnySource {
    AnimeCix(AnimeCixClient),
    OpenAnime(OpenAnimeClient),
}

impl AnySource {
    pub fn new(kind: SourceKind, urls: &SourceUrls) -> Result<Self, SourceError> {
        Ok(match kind {
            SourceKind::AnimeCix => Self::AnimeCix(AnimeCixClient::new(&urls.animecix)?),
            SourceKind::OpenAnime => Self::OpenAnime(OpenAnimeClient::new(&urls.openanime)?),
        })
    }
}

macro_rules! dispatch {
    ($self:ident, $client:ident => $body:expr) => {
        match $self {
            AnySource::AnimeCix($client) => $body,
            AnySource::OpenAnime($client) => $body,
        }
    };
}

impl AnimeSource for AnySource {
    fn kind(&self) -> SourceKind {
        dispatch!(self, c => c.kind())
    }

    fn supports_fansubs(&self) -> bool {
        dispatch!(self, c => c.supports_fansubs())
    }

    async fn search(&self, query: &str) -> Result<Vec<Series>, SourceError> {
        dispatch!(self, c => c.search(query).await)
    }

    async fn series(&self, id: &SeriesRef) -> Result<Series, SourceError> {
        dispatch!(self, c => c.series(id).await)
    }

    async fn seasons(&self, series: &SeriesRef) -> Result<Vec<SeasonInfo>, SourceError> {
        dispatch!(self, c => c.seasons(series).await)
    }

    async fn episodes(&self, series: &SeriesRef) -> Result<Vec<Episode>, SourceError> {
        dispatch!(self, c => c.episodes(series).await)
    }

    async fn episode_streams(&self, episode: &Episode) -> Result<StreamSet, SourceError> {
        dispatch!(self, c => c.episode_streams(episode).await)
    }

    async fn movie_streams(&self, series: &SeriesRef) -> Result<StreamSet, SourceError> {
        dispatch!(self, c => c.movie_streams(series).await)
    }

    async fn season_subtitle(
        &self,
        series: &SeriesRef,
        season_index: usize,
        episode_offset: usize,
    ) -> Result<Option<String>, SourceError> {
        dispatch!(self, c => c.season_subtitle(series, season_index, episode_offset).await)
    }

    async fn fansub_catalog(
        &self,
        series: &SeriesRef,
        episode: &Episode,
    ) -> Result<FansubCatalog, SourceError> {
        dispatch!(self, c => c.fansub_catalog(series, episode).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_source_reports_kind() {
        let urls = SourceUrls::default();
        for &kind in SourceKind::ALL {
            let source = AnySource::new(kind, &urls).unwrap();
            assert_eq!(source.kind(), kind);
            assert_eq!(source.supports_fansubs(), kind == SourceKind::OpenAnime);
        }
    }

    #[tokio::test]
    async fn test_animecix_rejects_fansub_listing() {
        let source = AnySource::new(SourceKind::AnimeCix, &SourceUrls::default()).unwrap();
        let err = source
            .fansub_catalog(&SeriesRef::Id(1), &Episode::movie("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SourceError::Unsupported {
                kind: SourceKind::AnimeCix,
                ..
            }
        ));
    }
}
