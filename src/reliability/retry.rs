// Exponential backoff with jitter for transient upstream faults. Retries
// never bypass a circuit breaker: callers check `allow_request()` before
// entering a retry loop, and a `CircuitOpen` error short-circuits it.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt as i32);
        let scaled = self.base_delay.as_secs_f64() * exp;
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let jitter: f64 = rand::thread_rng().gen_range(0.0..(self.base_delay.as_secs_f64() / 2.0).max(0.001));
        Duration::from_secs_f64(capped + jitter)
    }

    /// Runs `op` up to `max_attempts` times. `is_retryable` decides whether
    /// a given error should trigger another attempt; a non-retryable error
    /// (or the final attempt) returns immediately.
    pub async fn run<T, E, F, Fut>(&self, is_retryable: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after delay");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        let d0 = policy.delay_for_attempt(0).as_secs_f64();
        let d3 = policy.delay_for_attempt(3).as_secs_f64();
        assert!(d3 >= d0);
        assert!(policy.delay_for_attempt(10).as_secs_f64() <= 0.5 + 0.05);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.0,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = policy
            .run(
                |_e: &&str| true,
                || async {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                },
            )
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_returns_immediately() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = policy
            .run(
                |_e: &&str| false,
                || async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                },
            )
            .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
