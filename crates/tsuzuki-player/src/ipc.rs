//! mpv JSON IPC.
//!
//! Requests are single JSON lines `{"command": [...], "request_id": N}`; the
//! player answers with `{"error": "success", "data": ..., "request_id": N}`
//! interleaved with unsolicited event lines, which are skipped.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

use crate::error::PlayerError;

pub const DEFAULT_IPC_TIMEOUT: Duration = Duration::from_secs(2);

/// Narrow control surface the orchestrator needs from a running player.
pub trait PlayerControl: Send + Sync + 'static {
    /// Query a single player property.
    fn get_property(&self, name: &str) -> impl Future<Output = Result<Value, PlayerError>> + Send;

    /// Lightweight check that the player is accepting commands.
    fn probe(&self) -> impl Future<Output = bool> + Send {
        async move { self.get_property("mpv-version").await.is_ok() }
    }

    /// Query a numeric property such as `duration` or `time-pos`.
    fn get_f64(&self, name: &str) -> impl Future<Output = Result<f64, PlayerError>> + Send {
        async move {
            let value = self.get_property(name).await?;
            value.as_f64().ok_or_else(|| PlayerError::Property {
                name: name.to_string(),
                value,
            })
        }
    }

    /// Query a boolean property such as `pause`.
    fn get_bool(&self, name: &str) -> impl Future<Output = Result<bool, PlayerError>> + Send {
        async move {
            let value = self.get_property(name).await?;
            value.as_bool().ok_or_else(|| PlayerError::Property {
                name: name.to_string(),
                value,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    request_id: Option<u64>,
    error: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Reply {
    fn into_result(self) -> Result<Value, PlayerError> {
        match self.error.as_deref() {
            Some("success") => Ok(self.data),
            Some(other) => Err(PlayerError::Command(other.to_string())),
            None => Err(PlayerError::Command("reply without status".into())),
        }
    }
}

/// Client for an mpv `--input-ipc-server` socket. Every request opens a fresh
/// connection so a stalled reply can never wedge later queries.
#[derive(Debug, Clone)]
pub struct MpvIpc {
    socket: PathBuf,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl MpvIpc {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: DEFAULT_IPC_TIMEOUT,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Send one command and wait for its matching reply.
    pub async fn command(&self, args: Value) -> Result<Value, PlayerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&json!({ "command": args, "request_id": id }))?;
        line.push('\n');

        match tokio::time::timeout(self.timeout, self.exchange(line, id)).await {
            Ok(result) => result,
            Err(_) => Err(PlayerError::Timeout(self.timeout)),
        }
    }

    #[cfg(unix)]
    async fn exchange(&self, line: String, id: u64) -> Result<Value, PlayerError> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        use tokio::net::UnixStream;

        let stream = UnixStream::connect(&self.socket).await?;
        let (read, mut write) = stream.into_split();
        write.write_all(line.as_bytes()).await?;
        write.flush().await?;

        let mut lines = BufReader::new(read).lines();
        while let Some(raw) = lines.next_line().await? {
            let reply: Reply = match serde_json::from_str(&raw) {
                Ok(reply) => reply,
                Err(_) => continue,
            };
            if reply.request_id == Some(id) {
                trace!(id, "mpv reply");
                return reply.into_result();
            }
        }
        Err(PlayerError::Closed)
    }

    #[cfg(not(unix))]
    async fn exchange(&self, _line: String, _id: u64) -> Result<Value, PlayerError> {
        Err(PlayerError::Unsupported)
    }
}

impl PlayerControl for MpvIpc {
    async fn get_property(&self, name: &str) -> Result<Value, PlayerError> {
        self.command(json!(["get_property", name])).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;

    /// Fake player answering `get_property` with canned values, preceded by an
    /// unsolicited event line on every connection.
    fn spawn_fake_player(path: &Path) {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                let Ok(Some(line)) = lines.next_line().await else {
                    continue;
                };
                let req: Value = serde_json::from_str(&line).unwrap();
                let id = req["request_id"].clone();
                let reply = match req["command"][1].as_str() {
                    Some("duration") => json!({"error": "success", "data": 1440.5, "request_id": id}),
                    Some("pause") => json!({"error": "success", "data": true, "request_id": id}),
                    _ => json!({"error": "property unavailable", "request_id": id}),
                };
                let event = json!({"event": "playback-restart"});
                let out = format!("{event}\n{reply}\n");
                let _ = write.write_all(out.as_bytes()).await;
            }
        });
    }

    #[tokio::test]
    async fn test_get_property_skips_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mpv.sock");
        spawn_fake_player(&path);

        let ipc = MpvIpc::new(&path);
        assert_eq!(ipc.get_f64("duration").await.unwrap(), 1440.5);
        assert!(ipc.get_bool("pause").await.unwrap());
    }

    #[tokio::test]
    async fn test_error_reply_is_command_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mpv.sock");
        spawn_fake_player(&path);

        let ipc = MpvIpc::new(&path);
        let err = ipc.get_property("time-pos").await.unwrap_err();
        assert!(matches!(err, PlayerError::Command(ref e) if e == "property unavailable"));
        assert!(!ipc.probe().await);
    }

    #[tokio::test]
    async fn test_missing_socket_fails_probe() {
        let dir = tempfile::tempdir().unwrap();
        let ipc = MpvIpc::new(dir.path().join("absent.sock"));
        assert!(!ipc.probe().await);
        assert!(matches!(
            ipc.get_property("duration").await,
            Err(PlayerError::Io(_))
        ));
    }

    #[test]
    fn test_reply_status() {
        let ok: Reply = serde_json::from_str(r#"{"error":"success","data":3,"request_id":1}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), json!(3));
        let missing: Reply = serde_json::from_str(r#"{"request_id":1}"#).unwrap();
        assert!(missing.into_result().is_err());
    }
}
