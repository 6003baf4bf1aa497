use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files; useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup without `set_var`/`remove_var`.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let nonzero = |var: &str, value: u64| -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("CPDB_ENV", "development"));

    let bind_addr = parse("CPDB_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("CPDB_LOG_LEVEL", "info");
    let profiles_path = PathBuf::from(or_default("CPDB_PROFILES_PATH", "./config/profiles.yaml"));

    let db_max_connections = parse_u32("CPDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CPDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CPDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let discovery_api_key = lookup("CPDB_DISCOVERY_API_KEY").ok();
    let scraper_api_key = lookup("CPDB_SCRAPER_API_KEY").ok();
    let assessment_api_key = lookup("CPDB_ASSESSMENT_API_KEY").ok();
    let assessment_model = or_default("CPDB_ASSESSMENT_MODEL", "gpt-4o-mini");

    let discovery_timeout_secs = parse_u64("CPDB_DISCOVERY_TIMEOUT_SECS", "30")?;
    nonzero("CPDB_DISCOVERY_TIMEOUT_SECS", discovery_timeout_secs)?;
    let scraping_timeout_secs = parse_u64("CPDB_SCRAPING_TIMEOUT_SECS", "300")?;
    nonzero("CPDB_SCRAPING_TIMEOUT_SECS", scraping_timeout_secs)?;
    let assessment_timeout_secs = parse_u64("CPDB_ASSESSMENT_TIMEOUT_SECS", "60")?;
    nonzero("CPDB_ASSESSMENT_TIMEOUT_SECS", assessment_timeout_secs)?;

    let max_attempts = parse_u32("CPDB_MAX_ATTEMPTS", "3")?;
    nonzero("CPDB_MAX_ATTEMPTS", u64::from(max_attempts))?;
    let max_timeout_attempts = parse_u32("CPDB_MAX_TIMEOUT_ATTEMPTS", "2")?;
    nonzero("CPDB_MAX_TIMEOUT_ATTEMPTS", u64::from(max_timeout_attempts))?;
    let retry_backoff_base_ms = parse_u64("CPDB_RETRY_BACKOFF_BASE_MS", "1000")?;

    let max_concurrent_profiles = parse_usize("CPDB_MAX_CONCURRENT_PROFILES", "10")?;
    nonzero(
        "CPDB_MAX_CONCURRENT_PROFILES",
        u64::try_from(max_concurrent_profiles).unwrap_or(u64::MAX),
    )?;

    let batch_deadline_secs = match lookup("CPDB_BATCH_DEADLINE_SECS") {
        Ok(raw) => {
            let secs = raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
                var: "CPDB_BATCH_DEADLINE_SECS".to_string(),
                reason: e.to_string(),
            })?;
            nonzero("CPDB_BATCH_DEADLINE_SECS", secs)?;
            Some(secs)
        }
        Err(_) => None,
    };

    let discovery_max_results = parse_u32("CPDB_DISCOVERY_MAX_RESULTS", "5")?;
    let profile_host = or_default("CPDB_PROFILE_HOST", "linkedin.com").to_ascii_lowercase();
    let scraper_poll_interval_secs = parse_u64("CPDB_SCRAPER_POLL_INTERVAL_SECS", "10")?;
    let user_agent = or_default("CPDB_USER_AGENT", "cpdb/0.1 (profile-pipeline)");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        profiles_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        discovery_api_key,
        scraper_api_key,
        assessment_api_key,
        assessment_model,
        discovery_timeout_secs,
        scraping_timeout_secs,
        assessment_timeout_secs,
        max_attempts,
        max_timeout_attempts,
        retry_backoff_base_ms,
        max_concurrent_profiles,
        batch_deadline_secs,
        discovery_max_results,
        profile_host,
        scraper_poll_interval_secs,
        user_agent,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
