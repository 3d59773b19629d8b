use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PlayerError;
use crate::ipc::PlayerControl;

/// How long to wait for a freshly started player to accept commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(300),
        }
    }
}

/// Probe the player until it answers or the attempts run out.
pub async fn confirm_live<C: PlayerControl>(
    control: &C,
    policy: LivenessPolicy,
) -> Result<(), PlayerError> {
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.interval).await;
        if control.probe().await {
            debug!(attempt, "player is live");
            return Ok(());
        }
    }
    warn!(attempts = policy.attempts, "player never became live");
    Err(PlayerError::NotLive {
        attempts: policy.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use serde_json::Value;

    /// Answers once `live_after` probes have been made.
    #[derive(Clone)]
    struct SlowStart {
        probes: Arc<AtomicU32>,
        live_after: u32,
    }

    impl PlayerControl for SlowStart {
        async fn get_property(&self, _name: &str) -> Result<Value, PlayerError> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.live_after {
                Ok(Value::String("mpv 0.38".into()))
            } else {
                Err(PlayerError::Closed)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_on_third_probe() {
        let control = SlowStart {
            probes: Arc::new(AtomicU32::new(0)),
            live_after: 3,
        };
        let start = tokio::time::Instant::now();
        confirm_live(&control, LivenessPolicy::default()).await.unwrap();
        assert_eq!(control.probes.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bounded_attempts() {
        let control = SlowStart {
            probes: Arc::new(AtomicU32::new(0)),
            live_after: u32::MAX,
        };
        let err = confirm_live(&control, LivenessPolicy::default()).await.unwrap_err();
        assert!(matches!(err, PlayerError::NotLive { attempts: 10 }));
        assert_eq!(control.probes.load(Ordering::SeqCst), 10);
    }
}
