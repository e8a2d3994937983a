// Vector knowledge-base retrieval client. Results are cached under a hash of
// the query text with a 5-minute TTL and an LRU cap of 100 entries.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::PipelineError;
use crate::model_client::errors::{classify_reqwest_error, classify_status, is_retryable};
use crate::reliability::circuit_breaker::CircuitBreaker;
use crate::reliability::retry::RetryPolicy;
use crate::session::model::KbHit;

#[derive(serde::Serialize)]
struct QueryRequest<'a> {
    text: &'a str,
    k: u32,
}

#[derive(serde::Deserialize)]
struct QueryResponse {
    hits: Vec<KbHit>,
}

pub struct KbRetriever {
    http: reqwest::Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
    cache: moka::future::Cache<String, Arc<Vec<KbHit>>>,
    default_k: u32,
    retry_policy: RetryPolicy,
}

impl KbRetriever {
    pub fn new(base_url: String, breaker: Arc<CircuitBreaker>, retry_policy: RetryPolicy) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            base_url,
            breaker,
            cache: moka::future::Cache::builder()
                .time_to_live(Duration::from_secs(300))
                .max_capacity(100)
                .build(),
            default_k: 15,
            retry_policy,
        })
    }

    fn cache_key(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn query(&self, text: &str) -> Result<Arc<Vec<KbHit>>, PipelineError> {
        let key = Self::cache_key(text);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        if !self.breaker.allow_request().await {
            return Err(PipelineError::CircuitOpen("kb_service".to_string()));
        }

        let request = QueryRequest { text, k: self.default_k };
        let result = self
            .retry_policy
            .run(is_retryable, || async {
                let response = self
                    .http
                    .post(format!("{}/query", self.base_url))
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| classify_reqwest_error(&e))?;

                if let Some(err) = classify_status(response.status()) {
                    return Err(err);
                }

                let parsed: QueryResponse = response
                    .json()
                    .await
                    .map_err(|e| PipelineError::Internal(e.to_string()))?;
                Ok(parsed.hits)
            })
            .await;

        match &result {
            Ok(_) => self.breaker.record_success().await,
            Err(PipelineError::RateLimited { .. }) => {}
            Err(_) => self.breaker.record_failure().await,
        }

        let hits = Arc::new(result?);
        self.cache.insert(key, hits.clone()).await;
        Ok(hits)
    }

    /// Returns the top `m` hits from a full query result, preserving order.
    pub fn top(hits: &[KbHit], m: usize) -> Vec<KbHit> {
        hits.iter().take(m).cloned().collect()
    }

    /// Lightweight liveness probe for the auto-recovery loop — doesn't touch
    /// the query cache or the circuit breaker's own admission control.
    pub async fn probe(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }
}
