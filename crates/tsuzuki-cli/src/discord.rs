//! Discord Rich Presence integration.
//!
//! Runs a `DiscordIpcClient` on a dedicated OS thread (IPC is blocking)
//! and exposes a `DiscordHandle` implementing [`PresenceSink`] via an MPSC
//! channel. Connects lazily on first update and reconnects after failures.

use std::sync::mpsc;

use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};
use tracing::{debug, info};
use tsuzuki_core::{PresenceError, PresenceSink, PresenceStatus};

enum DiscordCommand {
    Update(PresenceStatus),
    Logout,
    Shutdown,
}

/// Cloneable handle to the Discord actor thread.
#[derive(Clone)]
pub struct DiscordHandle {
    tx: mpsc::Sender<DiscordCommand>,
}

impl DiscordHandle {
    /// Spawn the Discord actor thread and return a handle.
    pub fn start(app_id: &str) -> Result<Self, PresenceError> {
        let (tx, rx) = mpsc::channel();
        let app_id = app_id.to_string();

        std::thread::Builder::new()
            .name("discord-rpc".into())
            .spawn(move || actor_loop(&app_id, rx))
            .map_err(|e| PresenceError::Unavailable(e.to_string()))?;

        Ok(Self { tx })
    }

    /// Shut down the actor thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(DiscordCommand::Shutdown);
    }
}

impl PresenceSink for DiscordHandle {
    fn set_status(&self, status: &PresenceStatus) -> Result<(), PresenceError> {
        self.tx
            .send(DiscordCommand::Update(status.clone()))
            .map_err(|_| PresenceError::Unavailable("discord thread stopped".into()))
    }

    fn logout(&self) {
        let _ = self.tx.send(DiscordCommand::Logout);
    }
}

fn disconnect(client: &mut Option<DiscordIpcClient>) {
    if let Some(mut ipc) = client.take() {
        let _ = ipc.clear_activity();
        let _ = ipc.close();
    }
}

/// The actor loop: owns the IPC client and processes commands.
fn actor_loop(app_id: &str, rx: mpsc::Receiver<DiscordCommand>) {
    // Present only while connected.
    let mut client: Option<DiscordIpcClient> = None;

    for cmd in rx {
        match cmd {
            DiscordCommand::Update(status) => {
                if client.is_none() {
                    let mut ipc = DiscordIpcClient::new(app_id);
                    if let Err(e) = ipc.connect() {
                        debug!(error = %e, "Discord not available");
                        continue;
                    }
                    info!("Connected to Discord IPC");
                    client = Some(ipc);
                }
                let Some(ipc) = client.as_mut() else {
                    continue;
                };

                let payload = activity::Activity::new()
                    .details(&status.details)
                    .state(&status.state)
                    .timestamps(activity::Timestamps::new().start(status.started_at))
                    .assets(
                        activity::Assets::new()
                            .large_image(&status.large_image)
                            .large_text(&status.large_text)
                            .small_image(&status.small_image)
                            .small_text(&status.small_text),
                    );

                if let Err(e) = ipc.set_activity(payload) {
                    debug!(error = %e, "Failed to set Discord activity");
                    // Connection probably died; reconnect on the next update.
                    client = None;
                }
            }
            DiscordCommand::Logout => disconnect(&mut client),
            DiscordCommand::Shutdown => {
                disconnect(&mut client);
                break;
            }
        }
    }
}
