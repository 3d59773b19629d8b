mod discord;
mod error;
mod menu;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tsuzuki_api::{SourceError, SourceKind};
use tsuzuki_core::{AppConfig, HistoryStore, SessionEnv};
use tsuzuki_player::MpvLauncher;

use crate::discord::DiscordHandle;
use crate::error::CliError;
use crate::menu::Menu;

/// Watch anime from AnimeciX and OpenAnime in mpv.
#[derive(Debug, Parser)]
#[command(name = "tsuzuki", version, about)]
struct Cli {
    /// Do not publish Discord Rich Presence.
    #[arg(long)]
    disable_rpc: bool,

    /// Source to browse first (openanime, animecix).
    #[arg(long, value_parser = parse_source)]
    source: Option<SourceKind>,
}

fn parse_source(raw: &str) -> Result<SourceKind, String> {
    raw.parse().map_err(|e: SourceError| e.to_string())
}

/// Log to a file in the data dir; the terminal belongs to the menus.
fn init_logging() -> Option<WorkerGuard> {
    let dir = AppConfig::log_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("tsuzuki: cannot create log directory {}: {e}", dir.display());
        return None;
    }
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, "tsuzuki.log"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tsuzuki=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::load()?;
    if cli.disable_rpc {
        config.discord.enabled = false;
    }
    let kind = match cli.source {
        Some(kind) => kind,
        None => config.default_source()?,
    };

    let history = Arc::new(HistoryStore::new(AppConfig::history_path()));
    let launcher = MpvLauncher::new(config.player.binary.clone(), config.player.extra_args.clone());
    let mut env = SessionEnv::new(launcher, history.clone()).with_liveness(config.liveness());

    let discord = if config.discord.enabled {
        match DiscordHandle::start(&config.discord.app_id) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Discord presence disabled");
                None
            }
        }
    } else {
        None
    };
    if let Some(handle) = &discord {
        env = env.with_presence(Arc::new(handle.clone()));
    }

    info!(source = kind.key(), presence = discord.is_some(), "starting");
    let result = Menu::new(&config, &env, history).run(kind).await;

    if let Some(handle) = discord {
        handle.shutdown();
    }
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Prompt(inquire::InquireError::OperationInterrupted)) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            eprintln!("tsuzuki: {e}");
            ExitCode::FAILURE
        }
    }
}
