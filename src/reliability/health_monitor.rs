// Background loop probing every registered dependency on an interval,
// recording a bounded history ring buffer per dependency.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::RwLock;

const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRecord {
    pub at: DateTime<Utc>,
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DependencyHealth {
    pub name: String,
    pub healthy: bool,
    pub uptime_pct: f64,
    pub last_checked: Option<DateTime<Utc>>,
}

pub type Probe = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

struct Dependency {
    probe: Probe,
    required: bool,
    history: VecDeque<HealthRecord>,
}

/// Registry of dependency probes plus the background loop that runs them.
pub struct HealthMonitor {
    dependencies: RwLock<HashMap<String, Dependency>>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            dependencies: RwLock::new(HashMap::new()),
            interval,
        }
    }

    pub async fn register(&self, name: impl Into<String>, required: bool, probe: Probe) {
        let name = name.into();
        self.dependencies.write().await.insert(
            name,
            Dependency {
                probe,
                required,
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
            },
        );
    }

    async fn check_one(&self, name: &str) {
        let probe = {
            let deps = self.dependencies.read().await;
            match deps.get(name) {
                Some(d) => d.probe.clone(),
                None => return,
            }
        };

        let started = Instant::now();
        let result = probe().await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let (healthy, error) = match result {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e)),
        };

        let record = HealthRecord {
            at: Utc::now(),
            healthy,
            latency_ms,
            error,
        };

        let mut deps = self.dependencies.write().await;
        if let Some(dep) = deps.get_mut(name) {
            if dep.history.len() >= HISTORY_CAPACITY {
                dep.history.pop_front();
            }
            dep.history.push_back(record);
            if !healthy {
                tracing::warn!(dependency = name, "health probe failed");
            }
        }
    }

    pub async fn check_all(&self) {
        let names: Vec<String> = self.dependencies.read().await.keys().cloned().collect();
        for name in names {
            self.check_one(&name).await;
        }
    }

    /// Waits until every required dependency has at least one healthy
    /// observation, or `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_all().await;
            let deps = self.dependencies.read().await;
            let all_ready = deps
                .values()
                .filter(|d| d.required)
                .all(|d| d.history.back().map(|r| r.healthy).unwrap_or(false));
            drop(deps);
            if all_ready {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    pub async fn snapshot(&self) -> Vec<DependencyHealth> {
        let deps = self.dependencies.read().await;
        deps.iter()
            .map(|(name, dep)| {
                let total = dep.history.len();
                let healthy_count = dep.history.iter().filter(|r| r.healthy).count();
                DependencyHealth {
                    name: name.clone(),
                    healthy: dep.history.back().map(|r| r.healthy).unwrap_or(false),
                    uptime_pct: if total == 0 {
                        0.0
                    } else {
                        healthy_count as f64 / total as f64 * 100.0
                    },
                    last_checked: dep.history.back().map(|r| r.at),
                }
            })
            .collect()
    }

    pub async fn is_healthy(&self, name: &str) -> bool {
        self.dependencies
            .read()
            .await
            .get(name)
            .and_then(|d| d.history.back())
            .map(|r| r.healthy)
            .unwrap_or(true) // unknown dependency: don't block callers
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.interval;
        tokio::spawn(async move {
            tracing::info!("health_monitor: started (interval={}s)", interval.as_secs());
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.check_all().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_and_reports_healthy() {
        let monitor = HealthMonitor::new(Duration::from_secs(30));
        monitor
            .register("db", true, Arc::new(|| Box::pin(async { Ok(()) })))
            .await;
        monitor.check_all().await;
        let snap = monitor.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert!(snap[0].healthy);
    }

    #[tokio::test]
    async fn wait_ready_times_out_on_unhealthy_required_dep() {
        let monitor = HealthMonitor::new(Duration::from_secs(30));
        monitor
            .register("flaky", true, Arc::new(|| Box::pin(async { Err("down".to_string()) })))
            .await;
        let ready = monitor.wait_ready(Duration::from_millis(50)).await;
        assert!(!ready);
    }
}
