//! Interactive terminal menus.
//!
//! The main menu picks a series (search or history) on the current source;
//! the watch menu then drives a [`Session`] with one [`Command`] per choice.

use std::fmt;
use std::sync::Arc;

use inquire::{Select, Text};
use tracing::{info, warn};
use tsuzuki_api::{AnimeSource, AnySource, Series, SeriesRef, SourceKind, SourceUrls};
use tsuzuki_core::{AppConfig, Boundary, Command, HistoryStore, Session, SessionEnv, UiHint};
use tsuzuki_player::MpvLauncher;

use crate::error::CliError;

const PAGE_SIZE: usize = 15;

#[derive(Debug, Clone, Copy)]
enum MainOption {
    Search,
    History,
    SwitchSource(SourceKind),
    Quit,
}

impl fmt::Display for MainOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MainOption::Search => write!(f, "Search"),
            MainOption::History => write!(f, "Watch history"),
            MainOption::SwitchSource(current) => write!(f, "Switch source (current: {current})"),
            MainOption::Quit => write!(f, "Quit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchOption {
    Play,
    Next,
    Previous,
    SelectEpisode,
    SelectResolution,
    SelectFansub,
    SwitchSource,
    Back,
}

impl fmt::Display for WatchOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WatchOption::Play => "Play",
            WatchOption::Next => "Next episode",
            WatchOption::Previous => "Previous episode",
            WatchOption::SelectEpisode => "Select episode",
            WatchOption::SelectResolution => "Select resolution",
            WatchOption::SelectFansub => "Select fansub",
            WatchOption::SwitchSource => "Switch source",
            WatchOption::Back => "Back",
        };
        f.write_str(label)
    }
}

/// A labelled list entry that remembers its position.
struct Choice {
    index: usize,
    label: String,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

fn choices<I: IntoIterator<Item = String>>(labels: I) -> Vec<Choice> {
    labels
        .into_iter()
        .enumerate()
        .map(|(index, label)| Choice { index, label })
        .collect()
}

/// Prompt for one of `labels`; `None` when the user backs out.
fn pick(prompt: &str, labels: Vec<String>, cursor: usize) -> Result<Option<usize>, CliError> {
    if labels.is_empty() {
        return Ok(None);
    }
    let cursor = cursor.min(labels.len() - 1);
    let picked = Select::new(prompt, choices(labels))
        .with_page_size(PAGE_SIZE)
        .with_starting_cursor(cursor)
        .prompt_skippable()?;
    Ok(picked.map(|c| c.index))
}

fn series_label(series: &Series) -> String {
    if series.is_movie {
        format!("{} (Movie)", series.name)
    } else {
        series.name.clone()
    }
}

fn show_hint(hint: &UiHint) {
    match hint {
        UiHint::Boundary(Boundary::First) => println!("Already at the first episode."),
        UiHint::Boundary(Boundary::Last) => println!("Already at the last episode."),
        UiHint::FansubSelected { name, .. } => println!("Fansub: {name}"),
        UiHint::ResolutionSelected(label) => println!("Resolution: {label}"),
        UiHint::PlaybackFinished {
            exit_code,
            liveness_lost,
            history_recorded,
        } => {
            if *liveness_lost {
                println!("Player stopped responding.");
            } else if let Some(code) = exit_code.filter(|c| *c != 0) {
                println!("Player exited with code {code}.");
            }
            if *history_recorded {
                println!("Saved to watch history.");
            }
        }
        _ => {}
    }
}

pub struct Menu<'a> {
    config: &'a AppConfig,
    env: &'a SessionEnv<MpvLauncher>,
    history: Arc<HistoryStore>,
    urls: SourceUrls,
}

impl<'a> Menu<'a> {
    pub fn new(config: &'a AppConfig, env: &'a SessionEnv<MpvLauncher>, history: Arc<HistoryStore>) -> Self {
        Self {
            config,
            env,
            history,
            urls: config.source_urls(),
        }
    }

    pub async fn run(&self, initial: SourceKind) -> Result<(), CliError> {
        let mut source = AnySource::new(initial, &self.urls)?;

        loop {
            let kind = source.kind();
            let options = vec![
                MainOption::Search,
                MainOption::History,
                MainOption::SwitchSource(kind),
                MainOption::Quit,
            ];
            let Some(option) = Select::new(&format!("tsuzuki [{kind}]"), options).prompt_skippable()? else {
                return Ok(());
            };

            let series = match option {
                MainOption::Search => self.search(&source).await?,
                MainOption::History => self.from_history(&source).await?,
                MainOption::SwitchSource(_) => {
                    if let Some(next) = self.pick_source(kind)? {
                        source = AnySource::new(next, &self.urls)?;
                    }
                    continue;
                }
                MainOption::Quit => return Ok(()),
            };

            if let Some(series) = series {
                if let Some(next) = self.watch(source.clone(), series).await? {
                    source = AnySource::new(next, &self.urls)?;
                }
            }
        }
    }

    fn pick_source(&self, current: SourceKind) -> Result<Option<SourceKind>, CliError> {
        let cursor = SourceKind::ALL.iter().position(|k| *k == current).unwrap_or(0);
        let labels = SourceKind::ALL.iter().map(ToString::to_string).collect();
        Ok(pick("Source", labels, cursor)?.map(|i| SourceKind::ALL[i]))
    }

    async fn search(&self, source: &AnySource) -> Result<Option<Series>, CliError> {
        let Some(query) = Text::new("Search:").prompt_skippable()? else {
            return Ok(None);
        };
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let results = match source.search(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, query, "search failed");
                println!("Search failed: {e}");
                return Ok(None);
            }
        };
        if results.is_empty() {
            println!("No results for {query:?}.");
            return Ok(None);
        }

        let labels = results.iter().map(series_label).collect();
        let picked = pick("Series", labels, 0)?;
        Ok(picked.and_then(|i| results.into_iter().nth(i)))
    }

    async fn from_history(&self, source: &AnySource) -> Result<Option<Series>, CliError> {
        let recent = self
            .history
            .recent(source.kind(), self.config.general.history_limit)?;
        if recent.is_empty() {
            println!("No watch history for {}.", source.kind());
            return Ok(None);
        }

        let labels = recent
            .iter()
            .map(|r| format!("{} (last: {})", r.series_name, r.entry.last_episode_name))
            .collect();
        let Some(index) = pick("Continue watching", labels, 0)? else {
            return Ok(None);
        };
        let Some(id) = recent[index].entry.series_id.as_deref() else {
            return Ok(None);
        };

        match source.series(&SeriesRef::parse(id)).await {
            Ok(series) => Ok(Some(series)),
            Err(e) => {
                warn!(error = %e, id, "history lookup failed");
                println!("Could not load {}: {e}", recent[index].series_name);
                Ok(None)
            }
        }
    }

    /// Run the watch menu for one series. Returns the source to switch to, if any.
    async fn watch(&self, source: AnySource, series: Series) -> Result<Option<SourceKind>, CliError> {
        let name = series.name.clone();
        let mut session = match Session::open(source, series, self.env).await {
            Ok(session) => session,
            Err(e) => {
                println!("Could not open {name}: {e}");
                return Ok(None);
            }
        };
        info!(series = %name, episodes = session.episodes().len(), "watch menu");

        loop {
            let Some(episode) = session.selected_episode() else {
                return Ok(None);
            };
            let header = format!(
                "{name} | {} ({}/{}){}",
                episode.title,
                session.episode_index() + 1,
                session.episodes().len(),
                session.resolution().map(|r| format!(" [{r}]")).unwrap_or_default()
            );

            let mut options = vec![WatchOption::Play];
            if !session.is_movie() {
                options.extend([WatchOption::Next, WatchOption::Previous, WatchOption::SelectEpisode]);
            }
            options.push(WatchOption::SelectResolution);
            if session.source().supports_fansubs() && !session.is_movie() {
                options.push(WatchOption::SelectFansub);
            }
            options.extend([WatchOption::SwitchSource, WatchOption::Back]);

            let choice = Select::new(&header, options)
                .with_page_size(PAGE_SIZE)
                .prompt_skippable()?
                .unwrap_or(WatchOption::Back);

            let command = match choice {
                WatchOption::Play => Command::Play,
                WatchOption::Next => Command::Next,
                WatchOption::Previous => Command::Previous,
                WatchOption::SelectEpisode => {
                    let labels = session.episodes().iter().map(|e| e.title.clone()).collect();
                    match pick("Episode", labels, session.episode_index())? {
                        Some(index) => Command::SelectEpisode(index),
                        None => continue,
                    }
                }
                WatchOption::SelectResolution => match session.dispatch(Command::ListResolutions).await {
                    Ok(UiHint::Resolutions { labels, selected }) => {
                        match pick("Resolution", labels.clone(), selected)? {
                            Some(index) => Command::SelectResolution(labels[index].clone()),
                            None => continue,
                        }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                },
                WatchOption::SelectFansub => match session.dispatch(Command::ListFansubs).await {
                    Ok(UiHint::Fansubs { options, selected }) => {
                        let labels = options.into_iter().map(|f| f.name).collect();
                        match pick("Fansub", labels, selected)? {
                            Some(index) => Command::SelectFansub(index),
                            None => continue,
                        }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                },
                WatchOption::SwitchSource => match self.pick_source(session.source().kind())? {
                    Some(kind) => Command::SwitchSource(kind),
                    None => continue,
                },
                WatchOption::Back => Command::Quit,
            };

            if command == Command::Play {
                println!("Starting player...");
            }
            match session.dispatch(command).await {
                Ok(UiHint::SwitchSource(kind)) => return Ok(Some(kind)),
                Ok(UiHint::Exited) => return Ok(None),
                Ok(hint) => show_hint(&hint),
                Err(e) => println!("{e}"),
            }
        }
    }
}
