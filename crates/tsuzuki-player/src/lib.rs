//! External player supervision: launching mpv, talking to it over its JSON
//! IPC socket and confirming it is live before playback is considered started.

pub mod error;
pub mod ipc;
pub mod liveness;
pub mod process;

pub use error::PlayerError;
pub use ipc::{MpvIpc, PlayerControl};
pub use liveness::{confirm_live, LivenessPolicy};
pub use process::{LaunchRequest, Launcher, MpvLauncher, PlayerExit, PlayerHandle};
