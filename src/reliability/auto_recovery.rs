// Per-dependency recovery handler registry. Triggering a recovery that is
// already in progress for the same dependency is a no-op (idempotent
// collapse); triggers respect a cooldown and back off between attempts
// within a cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;

pub type Recover = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Idle,
    InProgress,
    Succeeded,
    ExhaustedAttempts,
}

struct Handler {
    recover: Recover,
    max_attempts: u32,
    cooldown: Duration,
    backoff_multiplier: f64,
    last_run: Option<Instant>,
    status: RecoveryStatus,
    running: bool,
}

pub struct AutoRecovery {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl AutoRecovery {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(
        &self,
        name: impl Into<String>,
        max_attempts: u32,
        cooldown: Duration,
        backoff_multiplier: f64,
        recover: Recover,
    ) {
        self.handlers.lock().await.insert(
            name.into(),
            Handler {
                recover,
                max_attempts,
                cooldown,
                backoff_multiplier,
                last_run: None,
                status: RecoveryStatus::Idle,
                running: false,
            },
        );
    }

    /// Triggers a recovery cycle for `name`. Returns `true` if recovery
    /// succeeded (or was already healthy), `false` otherwise. Concurrent
    /// triggers for the same name collapse: only the first caller actually
    /// runs the cycle.
    pub async fn trigger(&self, name: &str) -> bool {
        let (recover, max_attempts, cooldown, multiplier) = {
            let mut handlers = self.handlers.lock().await;
            let Some(handler) = handlers.get_mut(name) else {
                return false;
            };
            if handler.running {
                return false;
            }
            if let Some(last) = handler.last_run {
                if last.elapsed() < handler.cooldown {
                    tracing::debug!(dependency = name, "recovery cooldown active, skipping trigger");
                    return false;
                }
            }
            handler.running = true;
            handler.status = RecoveryStatus::InProgress;
            (
                handler.recover.clone(),
                handler.max_attempts,
                handler.cooldown,
                handler.backoff_multiplier,
            )
        };

        let mut succeeded = false;
        for attempt in 0..max_attempts {
            if recover().await {
                succeeded = true;
                break;
            }
            if attempt + 1 < max_attempts {
                let backoff = cooldown.mul_f64(multiplier.powi(attempt as i32)).min(Duration::from_secs(300));
                tokio::time::sleep(backoff).await;
            }
        }

        let mut handlers = self.handlers.lock().await;
        if let Some(handler) = handlers.get_mut(name) {
            handler.running = false;
            handler.last_run = Some(Instant::now());
            handler.status = if succeeded {
                RecoveryStatus::Succeeded
            } else {
                RecoveryStatus::ExhaustedAttempts
            };
        }

        if succeeded {
            tracing::info!(dependency = name, "recovery succeeded");
        } else {
            tracing::error!(dependency = name, "recovery exhausted {} attempts", max_attempts);
        }
        succeeded
    }

    pub async fn status(&self, name: &str) -> Option<RecoveryStatus> {
        self.handlers.lock().await.get(name).map(|h| h.status)
    }

    pub async fn snapshot(&self) -> Vec<(String, RecoveryStatus)> {
        self.handlers
            .lock()
            .await
            .iter()
            .map(|(name, h)| (name.clone(), h.status))
            .collect()
    }
}

impl Default for AutoRecovery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let registry = AutoRecovery::new();
        registry
            .register("db", 3, Duration::from_millis(10), 2.0, Arc::new(|| Box::pin(async { true })))
            .await;
        assert!(registry.trigger("db").await);
        assert_eq!(registry.status("db").await, Some(RecoveryStatus::Succeeded));
    }

    #[tokio::test]
    async fn exhausts_attempts_when_always_failing() {
        let registry = AutoRecovery::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        registry
            .register(
                "db",
                2,
                Duration::from_millis(1),
                1.0,
                Arc::new(move || {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async { false })
                }),
            )
            .await;
        assert!(!registry.trigger("db").await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.status("db").await, Some(RecoveryStatus::ExhaustedAttempts));
    }

    #[tokio::test]
    async fn cooldown_blocks_immediate_retrigger() {
        let registry = AutoRecovery::new();
        registry
            .register("db", 1, Duration::from_secs(60), 1.0, Arc::new(|| Box::pin(async { true })))
            .await;
        assert!(registry.trigger("db").await);
        assert!(!registry.trigger("db").await);
    }
}
