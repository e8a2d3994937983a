// Typed, fail-fast environment configuration. Parsed once at startup.

use std::time::Duration;

fn env_var(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{key} required"))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Clone, Debug)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl MysqlConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Process-wide configuration, parsed once in `main` and cloned into every
/// component that needs it.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub fir_auth_key: String,
    pub mysql: MysqlConfig,
    pub session_db_path: String,
    pub llm_service_url: String,
    pub asr_ocr_service_url: String,
    pub kb_service_url: String,
    pub cors_origins: Vec<String>,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub session_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub max_concurrent_model_calls: usize,
    pub health_check_interval: Duration,
    pub startup_timeout: Duration,
    pub recovery_interval: Duration,
    pub max_recovery_attempts: u32,
    pub environment: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mysql = MysqlConfig {
            host: env_var_or("MYSQL_HOST", "127.0.0.1"),
            port: env_parse_or("MYSQL_PORT", 3306),
            user: env_var("MYSQL_USER")?,
            password: env_var("MYSQL_PASSWORD")?,
            database: env_var("MYSQL_DB")?,
        };

        let cors_origins = env_var_or("CORS_ORIGINS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            api_key: env_var("API_KEY")?,
            fir_auth_key: env_var("FIR_AUTH_KEY")?,
            mysql,
            session_db_path: env_var_or("SESSION_DB_PATH", "sessions.db"),
            llm_service_url: env_var("LLM_SERVICE_URL")?,
            asr_ocr_service_url: env_var("ASR_OCR_SERVICE_URL")?,
            kb_service_url: env_var("KB_SERVICE_URL")?,
            cors_origins,
            rate_limit_requests: env_parse_or("RATE_LIMIT_REQUESTS", 100),
            rate_limit_window: Duration::from_secs(env_parse_or("RATE_LIMIT_WINDOW", 60)),
            session_timeout: Duration::from_secs(env_parse_or("SESSION_TIMEOUT", 3600)),
            max_concurrent_requests: env_parse_or("MAX_CONCURRENT_REQUESTS", 15),
            max_concurrent_model_calls: env_parse_or("MAX_CONCURRENT_MODEL_CALLS", 10),
            health_check_interval: Duration::from_secs(env_parse_or("HEALTH_CHECK_INTERVAL", 30)),
            startup_timeout: Duration::from_secs(env_parse_or("STARTUP_TIMEOUT", 300)),
            recovery_interval: Duration::from_secs(env_parse_or("RECOVERY_INTERVAL", 60)),
            max_recovery_attempts: env_parse_or("MAX_RECOVERY_ATTEMPTS", 3),
            environment: env_var_or("ENVIRONMENT", "development"),
            port: env_parse_or("PORT", 8080),
        })
    }

    /// A lightweight config sufficient for `AppState::new_test()` — no real
    /// upstream URLs or credentials are required since integration tests
    /// never actually reach the network.
    #[doc(hidden)]
    pub fn for_test() -> Self {
        Self {
            api_key: "test-api-key".to_string(),
            fir_auth_key: "test-auth-key".to_string(),
            mysql: MysqlConfig {
                host: "127.0.0.1".to_string(),
                port: 3306,
                user: "test".to_string(),
                password: "test".to_string(),
                database: "test".to_string(),
            },
            session_db_path: ":memory:".to_string(),
            llm_service_url: "http://127.0.0.1:1".to_string(),
            asr_ocr_service_url: "http://127.0.0.1:1".to_string(),
            kb_service_url: "http://127.0.0.1:1".to_string(),
            cors_origins: vec![],
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            session_timeout: Duration::from_secs(3600),
            max_concurrent_requests: 15,
            max_concurrent_model_calls: 10,
            health_check_interval: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(1),
            recovery_interval: Duration::from_secs(60),
            max_recovery_attempts: 3,
            environment: "test".to_string(),
            port: 0,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
