//! Watch session orchestration.
//!
//! A [`Session`] owns the selection state for one series on one source and
//! applies user [`Command`]s one at a time. Playing blocks until the player
//! exits or stops answering; meanwhile the history and presence pollers run
//! as tasks tied to a cancellation token owned by the session.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsuzuki_api::{AnimeSource, Episode, Fansub, FansubCatalog, Series, SourceError, SourceKind};
use tsuzuki_player::{confirm_live, LaunchRequest, Launcher, LivenessPolicy};

use crate::error::{SelectionError, SessionError};
use crate::history::{resume_offset, WatchHistory};
use crate::normalize::{normalize, QualityLadder, Target};
use crate::pollers::{
    HistoryPoller, PlaybackContext, PresencePoller, HISTORY_POLL_INTERVAL, PRESENCE_POLL_INTERVAL,
};
use crate::presence::PresenceSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Browsing,
    ResolutionPending,
    Playing,
    Exited,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectEpisode(usize),
    Next,
    Previous,
    ListFansubs,
    SelectFansub(usize),
    ListResolutions,
    SelectResolution(String),
    Play,
    SwitchSource(SourceKind),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    First,
    Last,
}

/// What the menu layer should show after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum UiHint {
    EpisodeSelected { index: usize, season_index: usize },
    /// Already at the first or last episode; nothing changed.
    Boundary(Boundary),
    Fansubs { options: Vec<Fansub>, selected: usize },
    FansubSelected { index: usize, name: String },
    Resolutions { labels: Vec<String>, selected: usize },
    ResolutionSelected(String),
    PlaybackFinished {
        exit_code: Option<i32>,
        /// The player stopped answering before its process exit was seen.
        liveness_lost: bool,
        history_recorded: bool,
    },
    SwitchSource(SourceKind),
    Exited,
}

/// Collaborators shared by every session of a run.
pub struct SessionEnv<L> {
    pub launcher: L,
    pub history: Arc<dyn WatchHistory>,
    pub presence: Option<Arc<dyn PresenceSink>>,
    pub liveness: LivenessPolicy,
    /// Unix timestamp the presence elapsed clock counts from.
    pub started_at: i64,
    pub history_interval: Duration,
    pub presence_interval: Duration,
}

impl<L: Launcher> SessionEnv<L> {
    pub fn new(launcher: L, history: Arc<dyn WatchHistory>) -> Self {
        Self {
            launcher,
            history,
            presence: None,
            liveness: LivenessPolicy::default(),
            started_at: chrono::Utc::now().timestamp(),
            history_interval: HISTORY_POLL_INTERVAL,
            presence_interval: PRESENCE_POLL_INTERVAL,
        }
    }

    pub fn with_presence(mut self, sink: Arc<dyn PresenceSink>) -> Self {
        self.presence = Some(sink);
        self
    }

    pub fn with_liveness(mut self, policy: LivenessPolicy) -> Self {
        self.liveness = policy;
        self
    }
}

/// How long a player that stopped answering gets to exit on its own.
pub const PLAYER_EXIT_GRACE: Duration = Duration::from_secs(3);

/// Ladder cache key: episode index and fansub index.
type LadderKey = (usize, Option<usize>);

pub struct Session<'env, S, L> {
    source: S,
    env: &'env SessionEnv<L>,
    series: Series,
    episodes: Vec<Episode>,
    is_movie: bool,
    state: SessionState,
    episode_idx: usize,
    season_idx: usize,
    fansub_idx: usize,
    resolution_idx: usize,
    resolution_label: Option<String>,
    ladder: Option<(LadderKey, QualityLadder)>,
    fansubs: Option<(usize, FansubCatalog)>,
}

impl<'env, S: AnimeSource, L: Launcher> Session<'env, S, L> {
    /// Fetch the episode list and start at the resume offset from history.
    pub async fn open(source: S, series: Series, env: &'env SessionEnv<L>) -> Result<Self, SessionError> {
        let seasons = source.seasons(&series.id).await?;
        let is_movie = series.is_movie || seasons.first().is_some_and(|s| s.is_movie);

        let episodes = if is_movie {
            vec![Episode::movie(&series.name)]
        } else {
            source.episodes(&series.id).await?
        };
        if episodes.is_empty() {
            return Err(SourceError::NotFound(format!("no episodes for {}", series.name)).into());
        }

        let last = env
            .history
            .last_finished(source.kind(), &series.name)
            .unwrap_or_else(|e| {
                warn!(series = %series.name, error = %e, "could not read history");
                None
            });
        let start = resume_offset(last, episodes.len());
        info!(
            source = source.kind().key(),
            series = %series.name,
            episodes = episodes.len(),
            is_movie,
            start,
            "session opened"
        );
        Ok(Self::new(source, series, episodes, is_movie, start, env))
    }

    /// Build a session from already fetched episodes. `start` is clamped to
    /// the episode list.
    pub fn new(
        source: S,
        series: Series,
        episodes: Vec<Episode>,
        is_movie: bool,
        start: usize,
        env: &'env SessionEnv<L>,
    ) -> Self {
        let episode_idx = if start < episodes.len() { start } else { 0 };
        let season_idx = episodes.get(episode_idx).map_or(0, Episode::season_index);
        Self {
            source,
            env,
            series,
            episodes,
            is_movie,
            state: SessionState::Browsing,
            episode_idx,
            season_idx,
            fansub_idx: 0,
            resolution_idx: 0,
            resolution_label: None,
            ladder: None,
            fansubs: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn is_movie(&self) -> bool {
        self.is_movie
    }

    pub fn episode_index(&self) -> usize {
        self.episode_idx
    }

    pub fn season_index(&self) -> usize {
        self.season_idx
    }

    pub fn fansub_index(&self) -> usize {
        self.fansub_idx
    }

    pub fn selected_episode(&self) -> Option<&Episode> {
        self.episodes.get(self.episode_idx)
    }

    /// Label of the stream `play` would use, once a ladder is loaded.
    pub fn resolution(&self) -> Option<&str> {
        self.current_ladder()
            .and_then(|l| l.get(self.resolution_idx))
            .map(|s| s.label.as_str())
    }

    pub async fn dispatch(&mut self, command: Command) -> Result<UiHint, SessionError> {
        if self.state == SessionState::Exited {
            return Err(SessionError::Closed);
        }
        debug!(?command, state = ?self.state, "dispatch");
        match command {
            Command::SelectEpisode(index) => self.select_episode(index),
            Command::Next => self.step(1),
            Command::Previous => self.step(-1),
            Command::ListFansubs => {
                self.require_fansubs()?;
                self.ensure_fansubs().await?;
                let options = self.cached_fansubs().map(FansubCatalog::fansubs).unwrap_or_default();
                Ok(UiHint::Fansubs {
                    options,
                    selected: self.fansub_idx,
                })
            }
            Command::SelectFansub(index) => self.select_fansub(index).await,
            Command::ListResolutions => {
                self.ensure_ladder().await?;
                let labels = self.current_ladder().map(QualityLadder::labels).unwrap_or_default();
                Ok(UiHint::Resolutions {
                    labels,
                    selected: self.resolution_idx,
                })
            }
            Command::SelectResolution(label) => self.select_resolution(label).await,
            Command::Play => self.play().await,
            Command::SwitchSource(kind) => {
                if self.state != SessionState::Browsing {
                    return Err(SelectionError::NotBrowsing.into());
                }
                info!(from = self.source.kind().key(), to = kind.key(), "switching source");
                self.state = SessionState::Exited;
                Ok(UiHint::SwitchSource(kind))
            }
            Command::Quit => {
                self.state = SessionState::Exited;
                Ok(UiHint::Exited)
            }
        }
    }

    fn select_episode(&mut self, index: usize) -> Result<UiHint, SessionError> {
        if index >= self.episodes.len() {
            return Err(SelectionError::EpisodeOutOfRange {
                index,
                len: self.episodes.len(),
            }
            .into());
        }
        self.episode_idx = index;
        self.season_idx = self.episodes[index].season_index();
        Ok(UiHint::EpisodeSelected {
            index,
            season_index: self.season_idx,
        })
    }

    fn step(&mut self, delta: isize) -> Result<UiHint, SessionError> {
        match self.episode_idx.checked_add_signed(delta) {
            Some(index) if index < self.episodes.len() => self.select_episode(index),
            _ if delta < 0 => Ok(UiHint::Boundary(Boundary::First)),
            _ => Ok(UiHint::Boundary(Boundary::Last)),
        }
    }

    /// Whether ladders come from a fansub catalog.
    fn uses_fansubs(&self) -> bool {
        self.source.supports_fansubs() && !self.is_movie
    }

    fn require_fansubs(&self) -> Result<(), SessionError> {
        if self.uses_fansubs() {
            Ok(())
        } else {
            Err(SelectionError::FansubsUnsupported(self.source.kind()).into())
        }
    }

    /// Fetch the selected episode's fansub catalog unless it is cached. One
    /// fetch serves the fansub list and every release's ladder.
    async fn ensure_fansubs(&mut self) -> Result<(), SessionError> {
        if self.cached_fansubs().is_none() {
            let episode = &self.episodes[self.episode_idx];
            let catalog = self.source.fansub_catalog(&self.series.id, episode).await?;
            debug!(episode = self.episode_idx, releases = catalog.len(), "fansub catalog fetched");
            self.fansubs = Some((self.episode_idx, catalog));
        }
        Ok(())
    }

    fn cached_fansubs(&self) -> Option<&FansubCatalog> {
        match &self.fansubs {
            Some((idx, catalog)) if *idx == self.episode_idx => Some(catalog),
            _ => None,
        }
    }

    async fn select_fansub(&mut self, index: usize) -> Result<UiHint, SessionError> {
        self.require_fansubs()?;
        self.ensure_fansubs().await?;
        let Some(catalog) = self.cached_fansubs() else {
            return Err(SessionError::NoStreams);
        };
        let Some(release) = catalog.get(index) else {
            return Err(SelectionError::FansubOutOfRange {
                index,
                len: catalog.len(),
            }
            .into());
        };
        let name = release.fansub.name.clone();
        self.fansub_idx = index;
        self.ladder = None;
        Ok(UiHint::FansubSelected { index, name })
    }

    async fn select_resolution(&mut self, label: String) -> Result<UiHint, SessionError> {
        self.ensure_ladder().await?;
        let Some(index) = self.current_ladder().and_then(|l| l.position(&label)) else {
            return Err(SelectionError::UnknownResolution(label).into());
        };
        self.resolution_idx = index;
        self.resolution_label = Some(label.clone());
        Ok(UiHint::ResolutionSelected(label))
    }

    fn ladder_key(&self) -> LadderKey {
        (self.episode_idx, self.uses_fansubs().then_some(self.fansub_idx))
    }

    fn current_ladder(&self) -> Option<&QualityLadder> {
        match &self.ladder {
            Some((key, ladder)) if *key == self.ladder_key() => Some(ladder),
            _ => None,
        }
    }

    /// Make sure the ladder matches the current selection. On failure the
    /// previous ladder is kept.
    async fn ensure_ladder(&mut self) -> Result<(), SessionError> {
        if self.current_ladder().is_some() {
            return Ok(());
        }
        self.state = SessionState::ResolutionPending;
        let result = self.rebuild_ladder().await;
        self.state = SessionState::Browsing;
        result
    }

    /// Selection state only changes once the new ladder is in hand.
    async fn rebuild_ladder(&mut self) -> Result<(), SessionError> {
        let mut fansub_idx = self.fansub_idx;
        let ladder = if self.uses_fansubs() {
            self.ensure_fansubs().await?;
            let Some(catalog) = self.cached_fansubs() else {
                return Err(SessionError::NoStreams);
            };
            if fansub_idx >= catalog.len() {
                debug!(previous = fansub_idx, len = catalog.len(), "fansub not offered for this episode, using the first");
                fansub_idx = 0;
            }
            let target = Target::Fansub {
                catalog,
                index: fansub_idx,
            };
            normalize(&self.source, &self.series.id, target).await?
        } else {
            let target = if self.is_movie {
                Target::Movie
            } else {
                Target::Episode {
                    episodes: &self.episodes,
                    index: self.episode_idx,
                }
            };
            normalize(&self.source, &self.series.id, target).await?
        };
        self.fansub_idx = fansub_idx;

        self.resolution_idx = match self.resolution_label.as_deref().and_then(|l| ladder.position(l)) {
            Some(index) => index,
            None => self.resolution_idx.min(ladder.len().saturating_sub(1)),
        };
        self.ladder = Some((self.ladder_key(), ladder));
        Ok(())
    }

    fn player_title(&self) -> String {
        match self.selected_episode() {
            Some(ep) if !self.is_movie => format!("{} - {}", self.series.name, ep.title),
            _ => self.series.name.clone(),
        }
    }

    fn playback_context(&self) -> PlaybackContext {
        let episode_title = match self.selected_episode() {
            Some(ep) if !self.is_movie => ep.title.clone(),
            _ => self.series.name.clone(),
        };
        PlaybackContext {
            source: self.source.kind(),
            series_name: self.series.name.clone(),
            series_id: self.series.id.to_string(),
            poster_url: self.series.poster_url.clone(),
            episode_idx: self.episode_idx,
            episode_title,
            started_at: self.env.started_at,
        }
    }

    async fn play(&mut self) -> Result<UiHint, SessionError> {
        self.ensure_ladder().await?;
        let ladder = self.current_ladder().ok_or(SessionError::NoStreams)?;
        let stream = ladder
            .get(self.resolution_idx)
            .ok_or(SessionError::NoStreams)?;
        let request = LaunchRequest {
            url: stream.url.clone(),
            subtitle_url: ladder.subtitle_url.clone(),
            title: self.player_title(),
        };

        self.state = SessionState::ResolutionPending;
        let mut handle = match self.env.launcher.launch(&request) {
            Ok(handle) => handle,
            Err(e) => {
                self.state = SessionState::Browsing;
                return Err(e.into());
            }
        };
        if let Err(e) = confirm_live(handle.control(), self.env.liveness).await {
            self.state = SessionState::Browsing;
            return Err(e.into());
        }

        self.state = SessionState::Playing;
        info!(title = %request.title, endpoint = %handle.endpoint().display(), "playback started");

        let token = CancellationToken::new();
        let context = Arc::new(self.playback_context());
        let history_task = tokio::spawn(
            HistoryPoller::new(
                handle.control().clone(),
                Arc::clone(&self.env.history),
                Arc::clone(&context),
                token.clone(),
            )
            .with_period(self.env.history_interval)
            .run(),
        );
        let presence_task = self.env.presence.as_ref().map(|sink| {
            tokio::spawn(
                PresencePoller::new(
                    handle.control().clone(),
                    Arc::clone(sink),
                    Arc::clone(&context),
                    token.clone(),
                )
                .with_period(self.env.presence_interval)
                .run(),
            )
        });

        let mut exit = tokio::select! {
            exit = handle.wait() => Some(exit),
            _ = token.cancelled() => None,
        };
        token.cancel();
        let liveness_lost = exit.is_none();
        if liveness_lost {
            exit = match tokio::time::timeout(PLAYER_EXIT_GRACE, handle.wait()).await {
                Ok(exit) => Some(exit),
                Err(_) => {
                    warn!(grace = ?PLAYER_EXIT_GRACE, "player stopped answering and did not exit, killing it");
                    None
                }
            };
        }

        let history_recorded = history_task.await.unwrap_or_else(|e| {
            warn!(error = %e, "history poller panicked");
            false
        });
        if let Some(task) = presence_task {
            if let Err(e) = task.await {
                warn!(error = %e, "presence poller panicked");
            }
        }
        // Kills the player if it is still running.
        drop(handle);
        self.state = SessionState::Browsing;

        let exit_code = match exit {
            Some(Ok(status)) => status.code,
            Some(Err(e)) => {
                warn!(error = %e, "waiting for player failed");
                None
            }
            None => None,
        };
        info!(history_recorded, ?exit_code, "playback finished");
        Ok(UiHint::PlaybackFinished {
            exit_code,
            liveness_lost,
            history_recorded,
        })
    }
}
