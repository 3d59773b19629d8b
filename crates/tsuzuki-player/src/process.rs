use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::PlayerError;
use crate::ipc::{MpvIpc, PlayerControl};

/// What to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub url: String,
    pub subtitle_url: Option<String>,
    pub title: String,
}

/// How the player process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerExit {
    pub code: Option<i32>,
}

/// Starts a player and hands back its handle.
pub trait Launcher: Send + Sync {
    type Control: PlayerControl + Clone;

    fn launch(&self, request: &LaunchRequest) -> Result<PlayerHandle<Self::Control>, PlayerError>;
}

/// A running player: its control channel, the IPC endpoint it listens on and
/// a future resolving when the process exits.
///
/// Dropping the handle before the exit future completes kills the process.
pub struct PlayerHandle<C> {
    control: C,
    endpoint: PathBuf,
    exit: Option<BoxFuture<'static, Result<PlayerExit, PlayerError>>>,
}

impl<C> PlayerHandle<C> {
    pub fn new(
        control: C,
        endpoint: impl Into<PathBuf>,
        exit: impl Future<Output = Result<PlayerExit, PlayerError>> + Send + 'static,
    ) -> Self {
        Self {
            control,
            endpoint: endpoint.into(),
            exit: Some(exit.boxed()),
        }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    /// Wait for the process to exit. Cancel-safe: dropping the returned
    /// future leaves the process running and a later call resumes waiting.
    pub async fn wait(&mut self) -> Result<PlayerExit, PlayerError> {
        let exit = self.exit.as_mut().ok_or(PlayerError::AlreadyExited)?;
        let result = exit.await;
        self.exit = None;
        result
    }
}

impl<C> Drop for PlayerHandle<C> {
    fn drop(&mut self) {
        if self.endpoint.exists() {
            let _ = std::fs::remove_file(&self.endpoint);
        }
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for PlayerHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("control", &self.control)
            .field("endpoint", &self.endpoint)
            .field("running", &self.exit.is_some())
            .finish()
    }
}

/// Launches mpv with a per-launch IPC socket.
#[derive(Debug, Clone)]
pub struct MpvLauncher {
    binary: String,
    extra_args: Vec<String>,
}

impl MpvLauncher {
    pub fn new(binary: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args,
        }
    }

    fn args(&self, request: &LaunchRequest, socket: &Path) -> Vec<String> {
        let mut args = vec![
            format!("--input-ipc-server={}", socket.display()),
            format!("--force-media-title={}", request.title),
        ];
        if let Some(sub) = request.subtitle_url.as_deref().filter(|s| !s.is_empty()) {
            args.push(format!("--sub-file={sub}"));
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(request.url.clone());
        args
    }
}

impl Default for MpvLauncher {
    fn default() -> Self {
        Self::new("mpv", Vec::new())
    }
}

/// Unique socket path under the temp dir.
fn socket_path() -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    std::env::temp_dir().join(format!("tsuzuki-mpv-{}-{millis}.sock", std::process::id()))
}

impl Launcher for MpvLauncher {
    type Control = MpvIpc;

    fn launch(&self, request: &LaunchRequest) -> Result<PlayerHandle<MpvIpc>, PlayerError> {
        let socket = socket_path();
        let args = self.args(request, &socket);
        debug!(binary = %self.binary, ?args, "spawning player");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlayerError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        info!(pid = ?child.id(), socket = %socket.display(), title = %request.title, "player started");

        let exit = async move {
            let status = child.wait().await?;
            Ok(PlayerExit {
                code: status.code(),
            })
        };
        Ok(PlayerHandle::new(MpvIpc::new(&socket), socket, exit))
    }
}
