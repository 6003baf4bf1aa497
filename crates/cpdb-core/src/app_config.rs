use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub profiles_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub discovery_api_key: Option<String>,
    pub scraper_api_key: Option<String>,
    pub assessment_api_key: Option<String>,
    pub assessment_model: String,
    pub discovery_timeout_secs: u64,
    pub scraping_timeout_secs: u64,
    pub assessment_timeout_secs: u64,
    pub max_attempts: u32,
    pub max_timeout_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub max_concurrent_profiles: usize,
    /// Default wall-clock budget for a batch; unset means no deadline.
    pub batch_deadline_secs: Option<u64>,
    pub discovery_max_results: u32,
    pub profile_host: String,
    pub scraper_poll_interval_secs: u64,
    pub user_agent: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("profiles_path", &self.profiles_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "discovery_api_key",
                &self.discovery_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "scraper_api_key",
                &self.scraper_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "assessment_api_key",
                &self.assessment_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("assessment_model", &self.assessment_model)
            .field("discovery_timeout_secs", &self.discovery_timeout_secs)
            .field("scraping_timeout_secs", &self.scraping_timeout_secs)
            .field("assessment_timeout_secs", &self.assessment_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("max_timeout_attempts", &self.max_timeout_attempts)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("max_concurrent_profiles", &self.max_concurrent_profiles)
            .field("batch_deadline_secs", &self.batch_deadline_secs)
            .field("discovery_max_results", &self.discovery_max_results)
            .field("profile_host", &self.profile_host)
            .field(
                "scraper_poll_interval_secs",
                &self.scraper_poll_interval_secs,
            )
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
