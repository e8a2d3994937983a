// Three-state circuit breaker, one instance per protected dependency.
//
// closed -> open: on FAILURE_THRESHOLD consecutive failures.
// open -> half_open: after COOLDOWN_SECS elapsed, admits exactly one probe.
// half_open -> closed: probe succeeds. half_open -> open: probe fails.
//
// Thread-safe — atomics for counters, a small async lock guards state
// transitions so only one caller wins the half-open probe slot.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

const FAILURE_THRESHOLD: u32 = 5;
const COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    opened_at: Option<Instant>,
    /// true while a half-open probe is in flight — admits exactly one caller.
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    failure_count: AtomicU32,
    inner: RwLock<Inner>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_count: AtomicU32::new(0),
            inner: RwLock::new(Inner {
                state: BreakerState::Closed,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the caller may proceed. A `false` means fail fast —
    /// no network call should be made.
    pub async fn allow_request(&self) -> bool {
        let guard = self.inner.read().await;
        match guard.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false, // a probe is already admitted or pending promotion
            BreakerState::Open => {
                let opened_at = guard.opened_at;
                drop(guard);
                let Some(opened_at) = opened_at else { return true };
                if opened_at.elapsed() < COOLDOWN {
                    return false;
                }
                let mut wg = self.inner.write().await;
                if wg.state == BreakerState::Open && !wg.probe_in_flight {
                    wg.state = BreakerState::HalfOpen;
                    wg.probe_in_flight = true;
                    tracing::info!(breaker = %self.name, "cooldown elapsed, admitting half-open probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut wg = self.inner.write().await;
        if wg.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, "probe succeeded, circuit closed");
        }
        wg.state = BreakerState::Closed;
        wg.opened_at = None;
        wg.probe_in_flight = false;
    }

    pub async fn record_failure(&self) {
        let mut wg = self.inner.write().await;
        if wg.state == BreakerState::HalfOpen {
            wg.state = BreakerState::Open;
            wg.opened_at = Some(Instant::now());
            wg.probe_in_flight = false;
            tracing::warn!(breaker = %self.name, "half-open probe failed, re-opening");
            return;
        }

        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(breaker = %self.name, failures = count, "failure recorded");
        if count >= FAILURE_THRESHOLD && wg.state == BreakerState::Closed {
            wg.state = BreakerState::Open;
            wg.opened_at = Some(Instant::now());
            tracing::error!(
                breaker = %self.name,
                "tripped after {} consecutive failures — blocking for {}s",
                count,
                COOLDOWN.as_secs()
            );
        }
    }

    /// Manual operator reset: force closed and clear all counters.
    pub async fn reset(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut wg = self.inner.write().await;
        wg.state = BreakerState::Closed;
        wg.opened_at = None;
        wg.probe_in_flight = false;
        tracing::info!(breaker = %self.name, "manually reset");
    }

    pub async fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.inner.read().await.state;
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state,
            failure_count: self.failure_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test");
        for _ in 0..FAILURE_THRESHOLD {
            assert!(cb.allow_request().await);
            cb.record_failure().await;
        }
        assert!(!cb.allow_request().await);
        assert_eq!(cb.snapshot().await.state, BreakerState::Open);
    }

    #[tokio::test]
    async fn success_resets_closed_circuit() {
        let cb = CircuitBreaker::new("test");
        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        assert_eq!(cb.snapshot().await.failure_count, 0);
        assert!(cb.allow_request().await);
    }

    #[tokio::test]
    async fn manual_reset_clears_open_state() {
        let cb = CircuitBreaker::new("test");
        for _ in 0..FAILURE_THRESHOLD {
            cb.record_failure().await;
        }
        assert_eq!(cb.snapshot().await.state, BreakerState::Open);
        cb.reset().await;
        assert_eq!(cb.snapshot().await.state, BreakerState::Closed);
        assert!(cb.allow_request().await);
    }
}
