// Central dependency-injection container. Clone-friendly: every field is
// either Copy, an Arc, or itself Clone (sqlx pools).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::kb::KbRetriever;
use crate::middleware::RateLimiter;
use crate::model_client::ModelClient;
use crate::orchestrator::Orchestrator;
use crate::persistence::fir_store::FirStore;
use crate::persistence::session_store::SessionStore;
use crate::reliability::{self, ReliabilityRegistry};
use crate::secrets::SecretStore;
use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub start_time: Instant,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionManager>,
    pub fir_store: Arc<FirStore>,
    pub reliability: Arc<ReliabilityRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub secrets: Arc<SecretStore>,
    pub metrics_cache: Arc<moka::future::Cache<(), Arc<serde_json::Value>>>,
}

fn new_metrics_cache() -> Arc<moka::future::Cache<(), Arc<serde_json::Value>>> {
    Arc::new(
        moka::future::Cache::builder()
            .time_to_live(Duration::from_secs(10))
            .max_capacity(1)
            .build(),
    )
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let mysql_pool = sqlx::mysql::MySqlPoolOptions::new()
            .max_connections(15)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.mysql.connection_url())
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS fir_records (
                fir_number VARCHAR(64) PRIMARY KEY,
                session_id VARCHAR(64) NOT NULL,
                status VARCHAR(16) NOT NULL,
                fir_content LONGTEXT NOT NULL,
                auth_key_hash VARCHAR(128),
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                finalized_at DATETIME NULL,
                INDEX idx_session_id (session_id),
                INDEX idx_status (status),
                INDEX idx_created_at (created_at)
            )",
        )
        .execute(&mysql_pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                action VARCHAR(64) NOT NULL,
                details JSON NOT NULL,
                ip_address VARCHAR(64),
                at DATETIME NOT NULL
            )",
        )
        .execute(&mysql_pool)
        .await?;

        let fir_store = Arc::new(FirStore::new(mysql_pool));

        let session_store = Arc::new(SessionStore::connect(&config.session_db_path).await?);
        let sessions = Arc::new(SessionManager::new(session_store.clone()));

        let reliability = Arc::new(ReliabilityRegistry::new(config.health_check_interval, Duration::from_secs(30)));

        let model_client = Arc::new(ModelClient::new(
            config.llm_service_url.clone(),
            config.asr_ocr_service_url.clone(),
            reliability.breaker(reliability::DEP_LLM).expect("llm breaker registered").clone(),
            reliability.breaker(reliability::DEP_ASR_OCR).expect("asr_ocr breaker registered").clone(),
            config.max_concurrent_model_calls,
            reliability.retry_policy.clone(),
        )?);

        let kb = Arc::new(KbRetriever::new(
            config.kb_service_url.clone(),
            reliability.breaker(reliability::DEP_KB).expect("kb breaker registered").clone(),
            reliability.retry_policy.clone(),
        )?);

        let secrets = Arc::new(SecretStore::new(config.is_production()));

        let orchestrator = Arc::new(Orchestrator::new(
            sessions.clone(),
            model_client.clone(),
            kb.clone(),
            fir_store.clone(),
            secrets.clone(),
            config.fir_auth_key.clone(),
            config.max_concurrent_requests,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_requests, config.rate_limit_window));

        register_health_probes(&reliability, &fir_store, &session_store).await;
        register_recovery_handlers(
            &reliability,
            &fir_store,
            &session_store,
            &model_client,
            &kb,
            config.recovery_interval,
            config.max_recovery_attempts,
        )
        .await;

        Ok(Self {
            config,
            start_time: Instant::now(),
            orchestrator,
            sessions,
            fir_store,
            reliability,
            rate_limiter,
            secrets,
            metrics_cache: new_metrics_cache(),
        })
    }

    /// Test-only constructor — connects lazily so no real MySQL/SQLite file
    /// is needed. Suitable only for endpoints that don't issue real queries,
    /// matching the teacher's own `new_test()` caveat.
    #[doc(hidden)]
    pub async fn new_test() -> anyhow::Result<Self> {
        let config = Arc::new(Config::for_test());

        let mysql_pool = sqlx::mysql::MySqlPoolOptions::new()
            .connect_lazy(&config.mysql.connection_url())?;
        let fir_store = Arc::new(FirStore::new(mysql_pool));

        let session_store = Arc::new(SessionStore::connect(":memory:").await?);
        let sessions = Arc::new(SessionManager::new(session_store.clone()));

        let reliability = Arc::new(ReliabilityRegistry::new(config.health_check_interval, Duration::from_secs(1)));

        let model_client = Arc::new(ModelClient::new(
            config.llm_service_url.clone(),
            config.asr_ocr_service_url.clone(),
            reliability.breaker(reliability::DEP_LLM).unwrap().clone(),
            reliability.breaker(reliability::DEP_ASR_OCR).unwrap().clone(),
            config.max_concurrent_model_calls,
            reliability.retry_policy.clone(),
        )?);

        let kb = Arc::new(KbRetriever::new(
            config.kb_service_url.clone(),
            reliability.breaker(reliability::DEP_KB).unwrap().clone(),
            reliability.retry_policy.clone(),
        )?);

        let secrets = Arc::new(SecretStore::new(false));

        let orchestrator = Arc::new(Orchestrator::new(
            sessions.clone(),
            model_client,
            kb,
            fir_store.clone(),
            secrets.clone(),
            config.fir_auth_key.clone(),
            config.max_concurrent_requests,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_requests, config.rate_limit_window));

        Ok(Self {
            config,
            start_time: Instant::now(),
            orchestrator,
            sessions,
            fir_store,
            reliability,
            rate_limiter,
            secrets,
            metrics_cache: new_metrics_cache(),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.reliability.gate.is_ready()
    }
}

async fn register_health_probes(
    reliability: &Arc<ReliabilityRegistry>,
    fir_store: &Arc<FirStore>,
    session_store: &Arc<SessionStore>,
) {
    let mysql_store = fir_store.clone();
    reliability
        .health
        .register(
            reliability::DEP_MYSQL,
            true,
            Arc::new(move || {
                let store = mysql_store.clone();
                Box::pin(async move { store.ping().await })
            }),
        )
        .await;

    let sqlite_store = session_store.clone();
    reliability
        .health
        .register(
            reliability::DEP_SESSION_STORE,
            true,
            Arc::new(move || {
                let store = sqlite_store.clone();
                Box::pin(async move { store.ping().await })
            }),
        )
        .await;
}

/// Wires one auto-recovery handler per dependency breaker. A recovery
/// "succeeds" when the dependency's own liveness probe comes back healthy;
/// the breaker itself is reset separately once traffic proves it out.
async fn register_recovery_handlers(
    reliability: &Arc<ReliabilityRegistry>,
    fir_store: &Arc<FirStore>,
    session_store: &Arc<SessionStore>,
    model_client: &Arc<ModelClient>,
    kb: &Arc<KbRetriever>,
    recovery_interval: Duration,
    max_attempts: u32,
) {
    let mysql_store = fir_store.clone();
    let mysql_breaker = reliability.breaker(reliability::DEP_MYSQL).expect("mysql breaker registered").clone();
    reliability
        .recovery
        .register(
            reliability::DEP_MYSQL,
            max_attempts,
            recovery_interval,
            2.0,
            Arc::new(move || {
                let store = mysql_store.clone();
                let breaker = mysql_breaker.clone();
                Box::pin(async move {
                    let ok = store.ping().await.is_ok();
                    if ok {
                        breaker.reset().await;
                    }
                    ok
                })
            }),
        )
        .await;

    let sqlite_store = session_store.clone();
    let sqlite_breaker = reliability.breaker(reliability::DEP_SESSION_STORE).expect("session_store breaker registered").clone();
    reliability
        .recovery
        .register(
            reliability::DEP_SESSION_STORE,
            max_attempts,
            recovery_interval,
            2.0,
            Arc::new(move || {
                let store = sqlite_store.clone();
                let breaker = sqlite_breaker.clone();
                Box::pin(async move {
                    let ok = store.ping().await.is_ok();
                    if ok {
                        breaker.reset().await;
                    }
                    ok
                })
            }),
        )
        .await;

    let llm_client = model_client.clone();
    let llm_breaker = reliability.breaker(reliability::DEP_LLM).expect("llm breaker registered").clone();
    reliability
        .recovery
        .register(
            reliability::DEP_LLM,
            max_attempts,
            recovery_interval,
            2.0,
            Arc::new(move || {
                let client = llm_client.clone();
                let breaker = llm_breaker.clone();
                Box::pin(async move {
                    let ok = client.probe_llm().await;
                    if ok {
                        breaker.reset().await;
                    }
                    ok
                })
            }),
        )
        .await;

    let asr_ocr_client = model_client.clone();
    let asr_ocr_breaker = reliability.breaker(reliability::DEP_ASR_OCR).expect("asr_ocr breaker registered").clone();
    reliability
        .recovery
        .register(
            reliability::DEP_ASR_OCR,
            max_attempts,
            recovery_interval,
            2.0,
            Arc::new(move || {
                let client = asr_ocr_client.clone();
                let breaker = asr_ocr_breaker.clone();
                Box::pin(async move {
                    let ok = client.probe_asr_ocr().await;
                    if ok {
                        breaker.reset().await;
                    }
                    ok
                })
            }),
        )
        .await;

    let kb_client = kb.clone();
    let kb_breaker = reliability.breaker(reliability::DEP_KB).expect("kb breaker registered").clone();
    reliability
        .recovery
        .register(
            reliability::DEP_KB,
            max_attempts,
            recovery_interval,
            2.0,
            Arc::new(move || {
                let client = kb_client.clone();
                let breaker = kb_breaker.clone();
                Box::pin(async move {
                    let ok = client.probe().await;
                    if ok {
                        breaker.reset().await;
                    }
                    ok
                })
            }),
        )
        .await;
}
