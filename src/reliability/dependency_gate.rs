// Startup barrier: the server must not accept traffic until every required
// dependency has reported healthy once, or STARTUP_TIMEOUT elapses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::health_monitor::HealthMonitor;

pub struct DependencyGate {
    ready: AtomicBool,
}

impl DependencyGate {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Awaits the health monitor until required dependencies are healthy or
    /// `timeout` elapses, then marks the gate ready regardless (optional
    /// dependencies degrade, they don't block forever).
    pub async fn wait_and_open(&self, monitor: &Arc<HealthMonitor>, timeout: Duration) {
        let all_healthy = monitor.wait_ready(timeout).await;
        if !all_healthy {
            tracing::warn!(
                "dependency_gate: startup timeout ({}s) reached before all required dependencies reported healthy",
                timeout.as_secs()
            );
        }
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("dependency_gate: open, accepting traffic");
    }
}

impl Default for DependencyGate {
    fn default() -> Self {
        Self::new()
    }
}
