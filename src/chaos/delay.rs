//! Injected latency before forwarding and before responding.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Configured delays in milliseconds. Zero disables a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub pre_delay_ms: u64,
    pub post_delay_ms: u64,
}

/// Holds the current delays. Reads are lock-free; every apply call sees the
/// value current at the time it starts.
#[derive(Debug)]
pub struct DelayController {
    current: ArcSwap<DelayConfig>,
}

impl Default for DelayController {
    fn default() -> Self {
        Self::new(DelayConfig::default())
    }
}

impl DelayController {
    pub fn new(initial: DelayConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn current(&self) -> DelayConfig {
        **self.current.load()
    }

    pub fn set_pre_delay(&self, ms: u64) {
        self.current.rcu(|c| DelayConfig {
            pre_delay_ms: ms,
            ..**c
        });
        tracing::info!(pre_delay_ms = ms, "Pre-delay updated");
    }

    pub fn set_post_delay(&self, ms: u64) {
        self.current.rcu(|c| DelayConfig {
            post_delay_ms: ms,
            ..**c
        });
        tracing::info!(post_delay_ms = ms, "Post-delay updated");
    }

    /// Replace both delays at once.
    pub fn set(&self, config: DelayConfig) {
        self.current.store(Arc::new(config));
    }

    /// Suspend for the pre-delay (before contacting upstream).
    pub async fn apply_pre(&self) {
        sleep_ms(self.current().pre_delay_ms).await;
    }

    /// Suspend for the post-delay (before answering the client).
    pub async fn apply_post(&self) {
        sleep_ms(self.current().post_delay_ms).await;
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_setters_are_independent() {
        let delays = DelayController::new(DelayConfig {
            pre_delay_ms: 5,
            post_delay_ms: 7,
        });
        delays.set_pre_delay(100);
        assert_eq!(delays.current().pre_delay_ms, 100);
        assert_eq!(delays.current().post_delay_ms, 7);

        delays.set_post_delay(0);
        assert_eq!(delays.current(), DelayConfig {
            pre_delay_ms: 100,
            post_delay_ms: 0,
        });
    }

    #[tokio::test]
    async fn test_zero_delay_is_immediate() {
        let delays = DelayController::default();
        let start = Instant::now();
        delays.apply_pre().await;
        delays.apply_post().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_delay_applies() {
        let delays = DelayController::default();
        delays.set_pre_delay(60);
        delays.set_post_delay(40);

        let start = Instant::now();
        delays.apply_pre().await;
        assert!(start.elapsed() >= Duration::from_millis(60));

        let start = Instant::now();
        delays.apply_post().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_concurrent_delays_do_not_serialize() {
        let delays = Arc::new(DelayController::default());
        delays.set_pre_delay(100);

        let start = Instant::now();
        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let delays = Arc::clone(&delays);
                tokio::spawn(async move { delays.apply_pre().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
