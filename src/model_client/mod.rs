// Pooled HTTP/2 client fronting the LLM and ASR/OCR inference servers, with
// per-endpoint circuit breakers, a global inference semaphore, a 30s health
// cache, and typed operations for each pipeline stage.

pub mod errors;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::PipelineError;
use crate::reliability::circuit_breaker::CircuitBreaker;
use crate::reliability::retry::RetryPolicy;
use errors::{classify_reqwest_error, classify_status, is_retryable};

const CALL_TIMEOUT: Duration = Duration::from_secs(45);
const HEALTH_CACHE_TTL: Duration = Duration::from_secs(30);

pub struct ModelClient {
    http: reqwest::Client,
    llm_url: String,
    asr_ocr_url: String,
    llm_breaker: Arc<CircuitBreaker>,
    asr_ocr_breaker: Arc<CircuitBreaker>,
    semaphore: Arc<Semaphore>,
    retry_policy: RetryPolicy,
    health_cache: moka::future::Cache<&'static str, bool>,
}

#[derive(serde::Serialize)]
struct InferenceRequest<'a> {
    model_name: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(serde::Deserialize)]
struct InferenceResponse {
    text: String,
}

#[derive(serde::Deserialize)]
struct TranscribeResponse {
    text: String,
}

impl ModelClient {
    pub fn new(
        llm_url: String,
        asr_ocr_url: String,
        llm_breaker: Arc<CircuitBreaker>,
        asr_ocr_breaker: Arc<CircuitBreaker>,
        max_concurrent_calls: usize,
        retry_policy: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(20)
            .timeout(CALL_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            llm_url,
            asr_ocr_url,
            llm_breaker,
            asr_ocr_breaker,
            semaphore: Arc::new(Semaphore::new(max_concurrent_calls)),
            retry_policy,
            health_cache: moka::future::Cache::builder()
                .time_to_live(HEALTH_CACHE_TTL)
                .max_capacity(8)
                .build(),
        })
    }

    /// Bypasses the health cache for use by the auto-recovery loop, which
    /// wants a fresh answer rather than a cached one up to 30s stale.
    pub async fn probe_llm(&self) -> bool {
        self.health_cache.invalidate("llm_service").await;
        self.health_ok("llm_service", &self.llm_url).await
    }

    pub async fn probe_asr_ocr(&self) -> bool {
        self.health_cache.invalidate("asr_ocr_service").await;
        self.health_ok("asr_ocr_service", &self.asr_ocr_url).await
    }

    async fn health_ok(&self, dependency: &'static str, base_url: &str) -> bool {
        if let Some(cached) = self.health_cache.get(dependency).await {
            return cached;
        }
        let healthy = self
            .http
            .get(format!("{base_url}/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false);
        self.health_cache.insert(dependency, healthy).await;
        healthy
    }

    async fn call_llm(&self, prompt: &str, max_tokens: u32) -> Result<String, PipelineError> {
        if !self.llm_breaker.allow_request().await {
            return Err(PipelineError::CircuitOpen("llm_service".to_string()));
        }
        if !self.health_ok("llm_service", &self.llm_url).await {
            return Err(PipelineError::CircuitOpen("llm_service".to_string()));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PipelineError::Internal("semaphore closed".to_string()))?;

        let body = InferenceRequest {
            model_name: "fir-pipeline",
            prompt,
            max_tokens,
        };

        let result = self
            .retry_policy
            .run(is_retryable, || async {
                let response = tokio::time::timeout(
                    CALL_TIMEOUT,
                    self.http.post(format!("{}/inference", self.llm_url)).json(&body).send(),
                )
                .await
                .map_err(|_| PipelineError::Timeout)?
                .map_err(|e| classify_reqwest_error(&e))?;

                if let Some(err) = classify_status(response.status()) {
                    return Err(err);
                }

                let parsed: InferenceResponse = response
                    .json()
                    .await
                    .map_err(|e| PipelineError::Internal(e.to_string()))?;
                if parsed.text.trim().is_empty() {
                    return Err(PipelineError::EmptyResponse);
                }
                Ok(parsed.text)
            })
            .await;

        match &result {
            Ok(_) => self.llm_breaker.record_success().await,
            Err(PipelineError::RateLimited { .. }) => {} // upstream asked us to slow down, not a health signal
            Err(_) => self.llm_breaker.record_failure().await,
        }
        result
    }

    async fn call_asr_ocr(&self, path: &str, bytes: bytes::Bytes, mime: &str) -> Result<String, PipelineError> {
        if !self.asr_ocr_breaker.allow_request().await {
            return Err(PipelineError::CircuitOpen("asr_ocr_service".to_string()));
        }
        if !self.health_ok("asr_ocr_service", &self.asr_ocr_url).await {
            return Err(PipelineError::CircuitOpen("asr_ocr_service".to_string()));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PipelineError::Internal("semaphore closed".to_string()))?;

        let url = format!("{}{}", self.asr_ocr_url, path);
        let mime = mime.to_string();
        let result = self
            .retry_policy
            .run(is_retryable, || {
                let bytes = bytes.clone();
                let mime = mime.clone();
                let url = url.clone();
                async move {
                    let part = reqwest::multipart::Part::bytes(bytes.to_vec()).mime_str(&mime).map_err(|e| {
                        PipelineError::Internal(e.to_string())
                    })?;
                    let form = reqwest::multipart::Form::new().part("file", part);

                    let response = tokio::time::timeout(CALL_TIMEOUT, self.http.post(&url).multipart(form).send())
                        .await
                        .map_err(|_| PipelineError::Timeout)?
                        .map_err(|e| classify_reqwest_error(&e))?;

                    if let Some(err) = classify_status(response.status()) {
                        return Err(err);
                    }

                    let parsed: TranscribeResponse =
                        response.json().await.map_err(|e| PipelineError::Internal(e.to_string()))?;
                    if parsed.text.trim().is_empty() {
                        return Err(PipelineError::EmptyResponse);
                    }
                    Ok(parsed.text)
                }
            })
            .await;

        match &result {
            Ok(_) => self.asr_ocr_breaker.record_success().await,
            Err(PipelineError::RateLimited { .. }) => {}
            Err(_) => self.asr_ocr_breaker.record_failure().await,
        }
        result
    }

    pub async fn summarise(&self, text: &str) -> Result<String, PipelineError> {
        let prompt = format!(
            "Summarise the following complaint in exactly two lines:\n\n{text}"
        );
        self.call_llm(&prompt, 256).await
    }

    pub async fn check_violation(&self, summary: &str, candidate_legal_text: &str) -> Result<bool, PipelineError> {
        let prompt = format!(
            "Complaint summary:\n{summary}\n\nCandidate legal provision:\n{candidate_legal_text}\n\n\
             Does the complaint describe a violation of this provision? Answer only 'yes' or 'no'."
        );
        let answer = self.call_llm(&prompt, 8).await?;
        Ok(answer.trim().to_lowercase().starts_with("yes"))
    }

    pub async fn narrate(&self, summary: &str, violation_texts: &[String]) -> Result<String, PipelineError> {
        let violations = violation_texts.join("\n");
        let prompt = format!(
            "Write a formal narrative paragraph for a First Information Report.\n\
             Summary: {summary}\nApplicable provisions:\n{violations}"
        );
        self.call_llm(&prompt, 1024).await
    }

    pub async fn finalise(&self, summary: &str, narrative: &str) -> Result<String, PipelineError> {
        let prompt = format!(
            "Produce the final FIR body text combining the summary and narrative.\n\
             Summary: {summary}\nNarrative: {narrative}"
        );
        self.call_llm(&prompt, 2048).await
    }

    pub async fn transcribe_audio(&self, bytes: bytes::Bytes) -> Result<String, PipelineError> {
        self.call_asr_ocr("/asr", bytes, "audio/wav").await
    }

    pub async fn ocr_image(&self, bytes: bytes::Bytes) -> Result<String, PipelineError> {
        self.call_asr_ocr("/ocr", bytes, "image/jpeg").await
    }
}
