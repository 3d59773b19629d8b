//! Turns a source's raw stream list into an ordered quality ladder.

use std::cmp::Reverse;
use std::collections::HashSet;

use tracing::{debug, warn};
use tsuzuki_api::{AnimeSource, Episode, FansubCatalog, SeriesRef, Stream, StreamSet};

use crate::error::{NormalizeError, SelectionError};

/// Streams of one episode or movie, best resolution first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QualityLadder {
    streams: Vec<Stream>,
    pub subtitle_url: Option<String>,
}

impl QualityLadder {
    /// Sort and deduplicate by label. Empty sets are an error so callers
    /// never index into an empty ladder.
    pub fn from_set(set: StreamSet) -> Result<Self, NormalizeError> {
        let mut seen = HashSet::new();
        let mut streams: Vec<Stream> = set
            .streams
            .into_iter()
            .filter(|s| !s.url.is_empty() && seen.insert(s.label.clone()))
            .collect();
        if streams.is_empty() {
            return Err(NormalizeError::NoStreams);
        }
        sort_ladder(&mut streams);
        Ok(Self {
            streams,
            subtitle_url: set.subtitle_url.filter(|s| !s.is_empty()),
        })
    }

    pub fn labels(&self) -> Vec<String> {
        self.streams.iter().map(|s| s.label.clone()).collect()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.streams.iter().position(|s| s.label == label)
    }

    pub fn get(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }

    pub(crate) fn len(&self) -> usize {
        self.streams.len()
    }
}

/// Numeric rank of a quality label: `"1080p"` -> 1080, `"Auto"` -> 0.
pub fn resolution_rank(label: &str) -> u32 {
    let trimmed = label.trim().trim_end_matches(|c: char| !c.is_ascii_digit());
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Stable sort, highest resolution first.
pub fn sort_ladder(streams: &mut [Stream]) {
    streams.sort_by_key(|s| Reverse(resolution_rank(&s.label)));
}

/// Zero-based position of `episodes[index]` within its season.
pub fn season_episode_offset(episodes: &[Episode], index: usize) -> usize {
    let Some(target) = episodes.get(index) else {
        return 0;
    };
    let season = target.season_index();
    episodes[..index]
        .iter()
        .filter(|e| e.season_index() == season)
        .count()
}

/// What to normalize streams for.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Movie,
    Episode { episodes: &'a [Episode], index: usize },
    /// One release from a fansub catalog the caller already fetched.
    Fansub { catalog: &'a FansubCatalog, index: usize },
}

pub async fn normalize<S: AnimeSource>(
    source: &S,
    series: &SeriesRef,
    target: Target<'_>,
) -> Result<QualityLadder, NormalizeError> {
    let (episodes, index) = match target {
        Target::Movie => {
            let set = source.movie_streams(series).await?;
            debug!(%series, count = set.streams.len(), "movie streams");
            return QualityLadder::from_set(set);
        }
        Target::Fansub { catalog, index } => {
            if catalog.is_empty() {
                return Err(NormalizeError::NoStreams);
            }
            let release = catalog.get(index).ok_or(SelectionError::FansubOutOfRange {
                index,
                len: catalog.len(),
            })?;
            debug!(%series, fansub = %release.fansub.name, count = release.streams.streams.len(), "fansub streams");
            return QualityLadder::from_set(release.streams.clone());
        }
        Target::Episode { episodes, index } => (episodes, index),
    };
    let episode = episodes
        .get(index)
        .ok_or(SelectionError::EpisodeOutOfRange {
            index,
            len: episodes.len(),
        })?;

    let mut set = source.episode_streams(episode).await?;
    if set.subtitle_url.as_deref().map_or(true, str::is_empty) {
        let offset = season_episode_offset(episodes, index);
        set.subtitle_url = match source
            .season_subtitle(series, episode.season_index(), offset)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!(%series, error = %e, "subtitle lookup failed, continuing without");
                None
            }
        };
    }
    debug!(%series, index, count = set.streams.len(), "episode streams");
    QualityLadder::from_set(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use tsuzuki_api::{
        EpisodeExtra, EpisodeNumber, Fansub, FansubRelease, SeasonInfo, Series, SourceError, SourceKind,
    };

    fn labels(raw: &[&str]) -> Vec<Stream> {
        raw.iter().map(|l| Stream::new(*l, format!("https://cdn.example/{l}"))).collect()
    }

    fn episode(season: u32, number: f64) -> Episode {
        Episode {
            title: format!("S{season}E{number}"),
            season,
            number: EpisodeNumber(number),
            locator: format!("videos/{season}-{number}"),
            extra: EpisodeExtra::None,
        }
    }

    #[test]
    fn test_sort_descending_stable() {
        let mut streams = labels(&["480p", "1080p", "720p", "Auto"]);
        sort_ladder(&mut streams);
        let order: Vec<_> = streams.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(order, ["1080p", "720p", "480p", "Auto"]);

        let mut ties = vec![
            Stream::new("Auto", "a"),
            Stream::new("720p", "b"),
            Stream::new("Source", "c"),
            Stream::new("720P", "d"),
        ];
        sort_ladder(&mut ties);
        let urls: Vec<_> = ties.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, ["b", "d", "a", "c"]);
    }

    #[test]
    fn test_resolution_rank() {
        assert_eq!(resolution_rank("1080p"), 1080);
        assert_eq!(resolution_rank(" 720 "), 720);
        assert_eq!(resolution_rank("Auto"), 0);
        assert_eq!(resolution_rank("HD 720p"), 0);
    }

    #[test]
    fn test_ladder_dedupes_and_rejects_empty() {
        let set = StreamSet {
            streams: vec![
                Stream::new("720p", "https://a"),
                Stream::new("1080p", "https://b"),
                Stream::new("720p", "https://c"),
                Stream::new("360p", ""),
            ],
            subtitle_url: Some(String::new()),
        };
        let ladder = QualityLadder::from_set(set).unwrap();
        assert_eq!(ladder.labels(), ["1080p", "720p"]);
        assert_eq!(ladder.get(1).unwrap().url, "https://a");
        assert!(ladder.subtitle_url.is_none());

        assert!(matches!(
            QualityLadder::from_set(StreamSet::default()),
            Err(NormalizeError::NoStreams)
        ));
    }

    #[test]
    fn test_season_episode_offset() {
        let episodes = vec![
            episode(1, 1.0),
            episode(1, 2.0),
            episode(2, 1.0),
            episode(2, 1.5),
            episode(2, 2.0),
        ];
        assert_eq!(season_episode_offset(&episodes, 0), 0);
        assert_eq!(season_episode_offset(&episodes, 1), 1);
        assert_eq!(season_episode_offset(&episodes, 2), 0);
        assert_eq!(season_episode_offset(&episodes, 4), 2);
        assert_eq!(season_episode_offset(&episodes, 9), 0);
    }

    /// Source with canned responses that records subtitle lookups.
    struct Canned {
        streams: Result<StreamSet, ()>,
        subtitle: Result<Option<String>, ()>,
        subtitle_calls: Mutex<Vec<(usize, usize)>>,
    }

    impl Canned {
        fn new(streams: &[&str]) -> Self {
            Self {
                streams: Ok(StreamSet {
                    streams: labels(streams),
                    subtitle_url: None,
                }),
                subtitle: Ok(Some("https://sub.example/tr.vtt".into())),
                subtitle_calls: Mutex::new(Vec::new()),
            }
        }

        fn streams(&self) -> Result<StreamSet, SourceError> {
            self.streams
                .clone()
                .map_err(|_| SourceError::Api { status: 503, message: "down".into() })
        }
    }

    impl AnimeSource for Canned {
        fn kind(&self) -> SourceKind {
            SourceKind::AnimeCix
        }

        async fn search(&self, _query: &str) -> Result<Vec<Series>, SourceError> {
            Ok(Vec::new())
        }

        async fn series(&self, id: &SeriesRef) -> Result<Series, SourceError> {
            Err(SourceError::NotFound(id.to_string()))
        }

        async fn seasons(&self, _series: &SeriesRef) -> Result<Vec<SeasonInfo>, SourceError> {
            Ok(Vec::new())
        }

        async fn episodes(&self, _series: &SeriesRef) -> Result<Vec<Episode>, SourceError> {
            Ok(Vec::new())
        }

        async fn episode_streams(&self, _episode: &Episode) -> Result<StreamSet, SourceError> {
            self.streams()
        }

        async fn movie_streams(&self, _series: &SeriesRef) -> Result<StreamSet, SourceError> {
            self.streams()
        }

        async fn season_subtitle(
            &self,
            _series: &SeriesRef,
            season_index: usize,
            episode_offset: usize,
        ) -> Result<Option<String>, SourceError> {
            self.subtitle_calls
                .lock()
                .unwrap()
                .push((season_index, episode_offset));
            self.subtitle
                .clone()
                .map_err(|_| SourceError::Parse("no captions".into()))
        }
    }

    #[tokio::test]
    async fn test_episode_with_season_subtitle() {
        let source = Canned::new(&["480p", "1080p"]);
        let episodes = vec![episode(1, 1.0), episode(2, 1.0), episode(2, 2.0)];
        let ladder = normalize(
            &source,
            &SeriesRef::Id(1),
            Target::Episode { episodes: &episodes, index: 2 },
        )
        .await
        .unwrap();

        assert_eq!(ladder.labels(), ["1080p", "480p"]);
        assert_eq!(ladder.subtitle_url.as_deref(), Some("https://sub.example/tr.vtt"));
        assert_eq!(*source.subtitle_calls.lock().unwrap(), [(1, 1)]);
    }

    #[tokio::test]
    async fn test_subtitle_failure_is_not_fatal() {
        let mut source = Canned::new(&["720p"]);
        source.subtitle = Err(());
        let episodes = vec![episode(1, 1.0)];
        let ladder = normalize(
            &source,
            &SeriesRef::Id(1),
            Target::Episode { episodes: &episodes, index: 0 },
        )
        .await
        .unwrap();
        assert!(ladder.subtitle_url.is_none());
    }

    #[tokio::test]
    async fn test_fetch_error_and_empty_result_are_distinct() {
        let mut source = Canned::new(&[]);
        let err = normalize(&source, &SeriesRef::Id(1), Target::Movie).await.unwrap_err();
        assert!(matches!(err, NormalizeError::NoStreams));

        source.streams = Err(());
        let err = normalize(&source, &SeriesRef::Id(1), Target::Movie).await.unwrap_err();
        assert!(matches!(err, NormalizeError::Source(_)));
    }

    fn release(id: &str, name: &str, labels_: &[&str]) -> FansubRelease {
        FansubRelease {
            fansub: Fansub { id: id.into(), name: name.into() },
            streams: StreamSet {
                streams: labels(labels_),
                subtitle_url: Some(format!("https://sub.example/{id}.vtt")),
            },
        }
    }

    #[tokio::test]
    async fn test_fansub_ladder_from_catalog() {
        let source = Canned::new(&[]);
        let series = SeriesRef::Slug("frieren".into());
        let catalog = FansubCatalog {
            releases: vec![
                release("a", "AniSub", &["720p"]),
                release("b", "Bakabt", &["720p", "1080p"]),
            ],
        };

        let ladder = normalize(&source, &series, Target::Fansub { catalog: &catalog, index: 1 })
            .await
            .unwrap();
        assert_eq!(ladder.labels(), ["1080p", "720p"]);
        assert_eq!(ladder.subtitle_url.as_deref(), Some("https://sub.example/b.vtt"));

        let err = normalize(&source, &series, Target::Fansub { catalog: &catalog, index: 2 })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::Selection(SelectionError::FansubOutOfRange { index: 2, len: 2 })
        ));

        let empty = FansubCatalog::default();
        let err = normalize(&source, &series, Target::Fansub { catalog: &empty, index: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, NormalizeError::NoStreams));
    }
}
