//! Background tasks bound to one playback: the history writer and the
//! presence updater. Both stop on the shared cancellation token, and either
//! one cancels it when the player stops answering.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsuzuki_api::SourceKind;
use tsuzuki_player::PlayerControl;

use crate::history::{HistoryEntry, WatchHistory};
use crate::presence::{PresenceSink, PresenceStatus, Progress};

pub const HISTORY_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const PRESENCE_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// An episode counts as watched once playback is this close to the end.
pub const FINISH_THRESHOLD: f64 = 300.0;
/// Consecutive unanswered liveness checks before the player is given up on.
pub const LIVENESS_FAILURE_LIMIT: u32 = 3;

/// What is being played, shared by both pollers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackContext {
    pub source: SourceKind,
    pub series_name: String,
    pub series_id: String,
    pub poster_url: Option<String>,
    pub episode_idx: usize,
    pub episode_title: String,
    pub started_at: i64,
}

impl PlaybackContext {
    fn history_entry(&self) -> HistoryEntry {
        HistoryEntry::new(self.episode_idx, &self.episode_title, &self.series_id)
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Counts unanswered checks; only a run of them means the player is gone.
#[derive(Debug, Default)]
struct Liveness {
    misses: u32,
}

impl Liveness {
    /// Returns false once the failure limit is reached.
    async fn check<C: PlayerControl>(&mut self, control: &C, poller: &str) -> bool {
        if control.probe().await {
            self.misses = 0;
            return true;
        }
        self.misses += 1;
        if self.misses >= LIVENESS_FAILURE_LIMIT {
            debug!(poller, misses = self.misses, "player lost");
            return false;
        }
        debug!(poller, misses = self.misses, "player did not answer, retrying next tick");
        true
    }
}

/// `(position, duration)`, or `None` when either query fails.
async fn read_position<C: PlayerControl>(control: &C) -> Option<(f64, f64)> {
    match (control.get_f64("time-pos").await, control.get_f64("duration").await) {
        (Ok(position), Ok(duration)) => Some((position, duration)),
        (p, d) => {
            debug!(position = ?p.err(), duration = ?d.err(), "property query failed, skipping tick");
            None
        }
    }
}

async fn read_progress<C: PlayerControl>(control: &C) -> Option<Progress> {
    let duration = control.get_f64("duration").await;
    let position = control.get_f64("time-pos").await;
    let paused = control.get_bool("pause").await;
    match (duration, position, paused) {
        (Ok(duration), Ok(position), Ok(paused)) => Some(Progress {
            position,
            duration,
            paused,
        }),
        (d, p, s) => {
            debug!(
                duration = ?d.err(),
                position = ?p.err(),
                pause = ?s.err(),
                "property query failed, skipping tick"
            );
            None
        }
    }
}

/// Writes one history entry once playback enters the last five minutes.
pub struct HistoryPoller<C> {
    control: C,
    history: Arc<dyn WatchHistory>,
    context: Arc<PlaybackContext>,
    period: Duration,
    token: CancellationToken,
}

impl<C: PlayerControl> HistoryPoller<C> {
    pub fn new(
        control: C,
        history: Arc<dyn WatchHistory>,
        context: Arc<PlaybackContext>,
        token: CancellationToken,
    ) -> Self {
        Self {
            control,
            history,
            context,
            period: HISTORY_POLL_INTERVAL,
            token,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// The store does blocking file IO, so the write runs off the runtime.
    async fn commit(&self) -> bool {
        let history = Arc::clone(&self.history);
        let ctx = Arc::clone(&self.context);
        let write = tokio::task::spawn_blocking(move || {
            history.record(ctx.source, &ctx.series_name, ctx.history_entry())
        });
        let ctx = &self.context;
        match write.await {
            Ok(Ok(())) => {
                info!(series = %ctx.series_name, episode = ctx.episode_idx, "episode marked as watched");
                true
            }
            Ok(Err(e)) => {
                warn!(series = %ctx.series_name, error = %e, "history write failed, will retry");
                false
            }
            Err(e) => {
                warn!(series = %ctx.series_name, error = %e, "history write task failed");
                false
            }
        }
    }

    /// Runs until cancelled or the player goes away. Returns whether an entry
    /// was written.
    pub async fn run(self) -> bool {
        let mut ticker = ticker(self.period);
        let mut liveness = Liveness::default();
        let mut committed = false;
        let mut pending = false;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !liveness.check(&self.control, "history").await {
                self.token.cancel();
                break;
            }
            if committed {
                continue;
            }
            let Some((position, duration)) = read_position(&self.control).await else {
                continue;
            };
            if position >= duration - FINISH_THRESHOLD {
                pending = true;
                committed = self.commit().await;
                pending &= !committed;
            }
        }

        if pending {
            committed = self.commit().await;
        }
        committed
    }
}

/// Pushes "now playing" updates and logs out when playback ends.
pub struct PresencePoller<C> {
    control: C,
    sink: Arc<dyn PresenceSink>,
    context: Arc<PlaybackContext>,
    period: Duration,
    token: CancellationToken,
}

impl<C: PlayerControl> PresencePoller<C> {
    pub fn new(
        control: C,
        sink: Arc<dyn PresenceSink>,
        context: Arc<PlaybackContext>,
        token: CancellationToken,
    ) -> Self {
        Self {
            control,
            sink,
            context,
            period: PRESENCE_POLL_INTERVAL,
            token,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub async fn run(self) {
        let mut ticker = ticker(self.period);
        let mut liveness = Liveness::default();
        let ctx = &self.context;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !liveness.check(&self.control, "presence").await {
                self.token.cancel();
                break;
            }
            let Some(progress) = read_progress(&self.control).await else {
                continue;
            };
            let status = PresenceStatus::playing(
                &ctx.series_name,
                ctx.poster_url.as_deref(),
                &ctx.episode_title,
                ctx.source,
                progress,
                ctx.started_at,
            );
            if let Err(e) = self.sink.set_status(&status) {
                warn!(error = %e, "presence update failed");
            }
        }

        self.sink.logout();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::{json, Value};
    use tsuzuki_player::PlayerError;

    use crate::error::{HistoryError, PresenceError};

    /// Scripted player: fixed progress, optionally dead from a given instant
    /// or unresponsive for a window.
    #[derive(Clone)]
    pub(crate) struct FakeControl {
        pub position: f64,
        pub duration: f64,
        pub paused: bool,
        pub pause_fails: bool,
        pub dead_at: Arc<Mutex<Option<Instant>>>,
        pub silent: Arc<Mutex<Option<(Instant, Instant)>>>,
        pub flaky: Arc<AtomicBool>,
    }

    impl FakeControl {
        pub fn new(position: f64, duration: f64) -> Self {
            Self {
                position,
                duration,
                paused: false,
                pause_fails: false,
                dead_at: Arc::new(Mutex::new(None)),
                silent: Arc::new(Mutex::new(None)),
                flaky: Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn die_after(&self, after: Duration) {
            *self.dead_at.lock().unwrap() = Some(Instant::now() + after);
        }

        /// Stop answering between `from` and `from + length`, then recover.
        pub fn silence(&self, from: Duration, length: Duration) {
            let start = Instant::now() + from;
            *self.silent.lock().unwrap() = Some((start, start + length));
        }

        fn is_dead(&self) -> bool {
            let now = Instant::now();
            let dead = self.dead_at.lock().unwrap().is_some_and(|at| now >= at);
            let silent = self
                .silent
                .lock()
                .unwrap()
                .is_some_and(|(from, until)| now >= from && now < until);
            dead || silent
        }
    }

    impl PlayerControl for FakeControl {
        async fn get_property(&self, name: &str) -> Result<Value, PlayerError> {
            if self.is_dead() {
                return Err(PlayerError::Closed);
            }
            match name {
                "mpv-version" => Ok(json!("mpv 0.38.0")),
                _ if self.flaky.load(Ordering::SeqCst) => Err(PlayerError::Command("busy".into())),
                "duration" => Ok(json!(self.duration)),
                "time-pos" => Ok(json!(self.position)),
                "pause" if self.pause_fails => Err(PlayerError::Timeout(Duration::from_secs(2))),
                "pause" => Ok(json!(self.paused)),
                other => Err(PlayerError::Command(format!("unknown property {other}"))),
            }
        }
    }

    /// Counts writes; can be told to fail the next N writes.
    #[derive(Default)]
    pub(crate) struct CountingHistory {
        pub writes: AtomicUsize,
        pub fail_next: AtomicUsize,
        pub last: Mutex<Option<(String, HistoryEntry)>>,
        pub resume_from: Option<usize>,
    }

    impl WatchHistory for CountingHistory {
        fn last_finished(&self, _source: SourceKind, _series_name: &str) -> Result<Option<usize>, HistoryError> {
            Ok(self.resume_from)
        }

        fn record(&self, _source: SourceKind, series_name: &str, entry: HistoryEntry) -> Result<(), HistoryError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let failing = self.fail_next.load(Ordering::SeqCst);
            if failing > 0 {
                self.fail_next.store(failing - 1, Ordering::SeqCst);
                return Err(HistoryError::Io(std::io::Error::other("disk full")));
            }
            *self.last.lock().unwrap() = Some((series_name.to_string(), entry));
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub statuses: Mutex<Vec<PresenceStatus>>,
        pub logouts: AtomicUsize,
        pub fail: AtomicBool,
    }

    impl PresenceSink for RecordingSink {
        fn set_status(&self, status: &PresenceStatus) -> Result<(), PresenceError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PresenceError::Update("pipe closed".into()));
            }
            self.statuses.lock().unwrap().push(status.clone());
            Ok(())
        }

        fn logout(&self) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn context() -> Arc<PlaybackContext> {
        Arc::new(PlaybackContext {
            source: SourceKind::OpenAnime,
            series_name: "Frieren".into(),
            series_id: "frieren".into(),
            poster_url: None,
            episode_idx: 3,
            episode_title: "4. Bölüm".into(),
            started_at: 0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_commits_once() {
        let history = Arc::new(CountingHistory::default());
        let token = CancellationToken::new();
        let poller = HistoryPoller::new(
            FakeControl::new(1300.0, 1440.0),
            history.clone(),
            context(),
            token.clone(),
        );
        let task = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_secs(65)).await;
        token.cancel();
        assert!(task.await.unwrap());
        assert_eq!(history.writes.load(Ordering::SeqCst), 1);
        let (series, entry) = history.last.lock().unwrap().clone().unwrap();
        assert_eq!(series, "Frieren");
        assert_eq!(entry.last_episode_idx, Some(3));
        assert_eq!(entry.series_id.as_deref(), Some("frieren"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_waits_for_threshold() {
        let history = Arc::new(CountingHistory::default());
        let token = CancellationToken::new();
        let poller = HistoryPoller::new(
            FakeControl::new(600.0, 1440.0),
            history.clone(),
            context(),
            token.clone(),
        );
        let task = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_secs(60)).await;
        token.cancel();
        assert!(!task.await.unwrap());
        assert_eq!(history.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_retries_failed_write_on_stop() {
        let history = Arc::new(CountingHistory::default());
        history.fail_next.store(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let control = FakeControl::new(1400.0, 1440.0);
        let poller = HistoryPoller::new(control, history.clone(), context(), token.clone());
        let task = tokio::spawn(poller.run());

        // First tick at 10s fails; cancel before the second tick.
        tokio::time::sleep(Duration::from_secs(15)).await;
        token.cancel();
        assert!(task.await.unwrap());
        assert_eq!(history.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_skips_failed_queries() {
        let history = Arc::new(CountingHistory::default());
        let token = CancellationToken::new();
        let control = FakeControl::new(1400.0, 1440.0);
        control.flaky.store(true, Ordering::SeqCst);
        let task = tokio::spawn(
            HistoryPoller::new(control.clone(), history.clone(), context(), token.clone()).run(),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(history.writes.load(Ordering::SeqCst), 0);
        assert!(!token.is_cancelled());

        control.flaky.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(history.writes.load(Ordering::SeqCst), 1);
        token.cancel();
        assert!(task.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_loss_stops_both_pollers() {
        let history = Arc::new(CountingHistory::default());
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let control = FakeControl::new(10.0, 1440.0);
        control.die_after(Duration::from_secs(12));

        let start = Instant::now();
        let h = tokio::spawn(
            HistoryPoller::new(control.clone(), history.clone(), context(), token.clone()).run(),
        );
        let p = tokio::spawn(
            PresencePoller::new(control.clone(), sink.clone(), context(), token.clone()).run(),
        );

        token.cancelled().await;
        // Presence misses at 15s, 20s and 25s and gives up first.
        assert_eq!(start.elapsed(), Duration::from_secs(25));
        assert!(!h.await.unwrap());
        p.await.unwrap();
        assert!(start.elapsed() <= Duration::from_secs(25) + PRESENCE_POLL_INTERVAL);
        assert_eq!(sink.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(sink.statuses.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_missed_check_is_tolerated() {
        let history = Arc::new(CountingHistory::default());
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let control = FakeControl::new(10.0, 1440.0);
        // Covers one presence tick (20s) and one history tick (20s).
        control.silence(Duration::from_secs(19), Duration::from_secs(2));

        let h = tokio::spawn(
            HistoryPoller::new(control.clone(), history.clone(), context(), token.clone()).run(),
        );
        let p = tokio::spawn(
            PresencePoller::new(control.clone(), sink.clone(), context(), token.clone()).run(),
        );

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert!(!token.is_cancelled());
        assert_eq!(sink.logouts.load(Ordering::SeqCst), 0);
        // Ticks at 5..=60s, minus the one at 20s.
        assert_eq!(sink.statuses.lock().unwrap().len(), 11);

        token.cancel();
        assert!(!h.await.unwrap());
        p.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_ignores_pause_query() {
        let history = Arc::new(CountingHistory::default());
        let token = CancellationToken::new();
        let mut control = FakeControl::new(1400.0, 1440.0);
        control.pause_fails = true;
        let task = tokio::spawn(
            HistoryPoller::new(control, history.clone(), context(), token.clone()).run(),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(history.writes.load(Ordering::SeqCst), 1);
        token.cancel();
        assert!(task.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_survives_update_failures() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let token = CancellationToken::new();
        let mut control = FakeControl::new(3725.0, 5400.0);
        control.paused = true;
        let task = tokio::spawn(
            PresencePoller::new(control, sink.clone(), context(), token.clone()).run(),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(sink.statuses.lock().unwrap().is_empty());
        sink.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
        task.await.unwrap();

        let statuses = sink.statuses.lock().unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, "4. Bölüm (01:02:05 / 01:30:00) (Paused)");
        assert_eq!(sink.logouts.load(Ordering::SeqCst), 1);
    }
}
