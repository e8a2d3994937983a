// Graceful shutdown token: tracks in-flight requests, rejects new ones once
// draining, and bounds the wait before forcing flush + exit.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct ShutdownToken {
    is_shutting_down: AtomicBool,
    active_requests: AtomicI64,
    pub timeout: Duration,
}

pub struct RequestGuard<'a> {
    token: &'a ShutdownToken,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.token.active_requests.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ShutdownToken {
    pub fn new(timeout: Duration) -> Self {
        Self {
            is_shutting_down: AtomicBool::new(false),
            active_requests: AtomicI64::new(0),
            timeout,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::Acquire)
    }

    /// Enters a tracked request. Returns `None` if the server is draining —
    /// the caller should reject with a 503 instead of entering the handler.
    pub fn enter(&self) -> Option<RequestGuard<'_>> {
        if self.is_shutting_down() {
            return None;
        }
        self.active_requests.fetch_add(1, Ordering::AcqRel);
        // Re-check: a shutdown signal may have landed between the check and
        // the increment. If so, back out rather than admit a straggler.
        if self.is_shutting_down() {
            self.active_requests.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(RequestGuard { token: self })
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.load(Ordering::Acquire)
    }

    /// Begins draining: rejects new requests and waits for in-flight ones to
    /// finish, up to `self.timeout`. Returns once drained or the deadline
    /// passes — the caller should flush durable state unconditionally after.
    pub async fn begin_drain(self: &Arc<Self>) {
        self.is_shutting_down.store(true, Ordering::Release);
        tracing::info!("shutdown: draining, waiting for in-flight requests");
        let deadline = tokio::time::Instant::now() + self.timeout;
        while self.active_requests() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.active_requests() > 0 {
            tracing::warn!(
                remaining = self.active_requests(),
                "shutdown: timeout reached with requests still in flight"
            );
        } else {
            tracing::info!("shutdown: all requests drained cleanly");
        }
    }
}
