use crate::app_config::{AppConfig, Environment, LinkingBackend};
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
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// The parsing/validation logic is decoupled from the real environment so it
/// can be tested with a plain `HashMap` lookup.
///
/// # Errors
///
/// Returns `ConfigError` if a value is invalid or `DATABASE_URL` is missing
/// for the Postgres backend.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
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

    let env = parse_environment(&or_default("FBASCAN_ENV", "development"))?;
    let log_level = or_default("FBASCAN_LOG_LEVEL", "info");

    let system_config_path = PathBuf::from(or_default(
        "FBASCAN_SYSTEM_CONFIG_PATH",
        "./config/system.yaml",
    ));
    let suppliers_path = PathBuf::from(or_default(
        "FBASCAN_SUPPLIERS_PATH",
        "./config/suppliers.yaml",
    ));
    let fee_schedule_path = lookup("FBASCAN_FEE_SCHEDULE_PATH").ok().map(PathBuf::from);
    let data_dir = PathBuf::from(or_default("FBASCAN_DATA_DIR", "./data"));

    let linking_backend = parse_linking_backend(&or_default("FBASCAN_LINKING_BACKEND", "json"))?;
    let database_url = lookup("DATABASE_URL").ok();
    if linking_backend == LinkingBackend::Postgres && database_url.is_none() {
        return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
    }

    let db_max_connections = parse_u32("FBASCAN_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("FBASCAN_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("FBASCAN_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let fetch_timeout_secs = parse_u64("FBASCAN_FETCH_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("FBASCAN_USER_AGENT", "fbascan/0.1 (supplier-analysis)");
    let fetch_max_attempts = parse_u32("FBASCAN_MAX_ATTEMPTS", "4")?;
    if fetch_max_attempts == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "FBASCAN_MAX_ATTEMPTS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let fetch_backoff_base_ms = parse_u64("FBASCAN_BACKOFF_BASE_MS", "500")?;
    let fetch_backoff_cap_ms = parse_u64("FBASCAN_BACKOFF_CAP_MS", "30000")?;

    let rates_url = or_default(
        "FBASCAN_RATES_URL",
        "https://open.er-api.com/v6/latest/USD",
    );
    let rates_refresh_secs = parse_u64("FBASCAN_RATES_REFRESH_SECS", "3600")?;
    let snapshot_max_age_secs = parse_u64("FBASCAN_SNAPSHOT_MAX_AGE_SECS", "86400")?;

    Ok(AppConfig {
        env,
        log_level,
        system_config_path,
        suppliers_path,
        fee_schedule_path,
        data_dir,
        linking_backend,
        database_url,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        fetch_timeout_secs,
        user_agent,
        fetch_max_attempts,
        fetch_backoff_base_ms,
        fetch_backoff_cap_ms,
        rates_url,
        rates_refresh_secs,
        snapshot_max_age_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "FBASCAN_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_linking_backend(s: &str) -> Result<LinkingBackend, ConfigError> {
    match s {
        "json" => Ok(LinkingBackend::Json),
        "postgres" => Ok(LinkingBackend::Postgres),
        other => Err(ConfigError::InvalidEnvVar {
            var: "FBASCAN_LINKING_BACKEND".to_string(),
            reason: format!("expected 'json' or 'postgres', got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
