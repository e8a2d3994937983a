// Sliding-window per-IP rate limiter. IP derivation order: X-Forwarded-For
// (first entry) -> X-Real-IP -> socket address.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use crate::error::PipelineError;
use crate::state::AppState;

pub struct RateLimiter {
    buckets: DashMap<IpAddr, VecDeque<Instant>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `Ok(())` if the request is admitted, or the number of
    /// seconds the caller should wait before retrying.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(ip).or_default();
        while let Some(&front) = bucket.front() {
            if now.duration_since(front) > self.window {
                bucket.pop_front();
            } else {
                break;
            }
        }
        if bucket.len() as u32 >= self.limit {
            return Err(self.window.as_secs());
        }
        bucket.push_back(now);
        Ok(())
    }
}

pub(crate) fn derive_ip(request: &Request) -> Option<IpAddr> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return Some(ip);
            }
        }
    }
    if let Some(real_ip) = request.headers().get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse() {
            return Some(ip);
        }
    }
    request.extensions().get::<ConnectInfo<std::net::SocketAddr>>().map(|ci| ci.0.ip())
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, PipelineError> {
    let ip = derive_ip(&request).unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]));
    let path = request.uri().path().to_string();

    match state.rate_limiter.check(ip) {
        Ok(()) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            if let Ok(value) = state.rate_limiter.limit().to_string().parse() {
                headers.insert("x-ratelimit-limit", value);
            }
            if let Ok(value) = state.rate_limiter.window().as_secs().to_string().parse() {
                headers.insert("x-ratelimit-window", value);
            }
            Ok(response)
        }
        Err(retry_after_secs) => {
            tracing::warn!(%ip, %path, "rate limit exceeded");
            crate::persistence::fir_store::log_audit(
                state.fir_store.pool(),
                "rate_limit_exceeded",
                serde_json::json!({ "path": path }),
                Some(&ip.to_string()),
            )
            .await;
            Err(PipelineError::RateLimited { retry_after_secs })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_until_limit_then_blocks() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_err());
    }

    #[test]
    fn separate_ips_have_separate_buckets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(b).is_ok());
        assert!(limiter.check(a).is_err());
    }
}
