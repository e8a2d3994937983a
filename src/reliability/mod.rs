// The reliability substrate: circuit breakers, retry policy, health
// monitoring, auto-recovery, the startup dependency gate, and the graceful
// shutdown token, composed behind a single registry handlers reach through
// `AppState`.

pub mod auto_recovery;
pub mod circuit_breaker;
pub mod dependency_gate;
pub mod health_monitor;
pub mod retry;
pub mod shutdown;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use auto_recovery::AutoRecovery;
use circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot};
use dependency_gate::DependencyGate;
use health_monitor::{DependencyHealth, HealthMonitor};
use retry::RetryPolicy;
use shutdown::ShutdownToken;

/// Names of the breakers/dependencies this crate protects. Kept centralised
/// so handlers and the registry agree on valid names.
pub const DEP_MYSQL: &str = "mysql";
pub const DEP_SESSION_STORE: &str = "session_store";
pub const DEP_LLM: &str = "llm_service";
pub const DEP_ASR_OCR: &str = "asr_ocr_service";
pub const DEP_KB: &str = "kb_service";

pub struct ReliabilityRegistry {
    pub breakers: HashMap<&'static str, Arc<CircuitBreaker>>,
    pub health: Arc<HealthMonitor>,
    pub recovery: Arc<AutoRecovery>,
    pub gate: Arc<DependencyGate>,
    pub shutdown: Arc<ShutdownToken>,
    pub retry_policy: RetryPolicy,
}

impl ReliabilityRegistry {
    pub fn new(health_check_interval: Duration, shutdown_timeout: Duration) -> Self {
        let mut breakers = HashMap::new();
        for name in [DEP_MYSQL, DEP_SESSION_STORE, DEP_LLM, DEP_ASR_OCR, DEP_KB] {
            breakers.insert(name, Arc::new(CircuitBreaker::new(name)));
        }

        Self {
            breakers,
            health: Arc::new(HealthMonitor::new(health_check_interval)),
            recovery: Arc::new(AutoRecovery::new()),
            gate: Arc::new(DependencyGate::new()),
            shutdown: Arc::new(ShutdownToken::new(shutdown_timeout)),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn breaker(&self, name: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(name)
    }

    pub async fn breaker_snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let mut snapshots = Vec::with_capacity(self.breakers.len());
        for breaker in self.breakers.values() {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots
    }

    pub async fn health_snapshot(&self) -> Vec<DependencyHealth> {
        self.health.snapshot().await
    }
}
