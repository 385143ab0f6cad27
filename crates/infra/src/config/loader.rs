//! Configuration loader
//!
//! Loads the metrics pipeline configuration from environment variables or
//! files.
//!
//! ## Loading Strategy
//! 1. First, applies environment variable overrides on top of defaults
//! 2. If the required variables are missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `TIDEMARK_DB_PATH`: Database file path (required for env loading)
//! - `TIDEMARK_DB_POOL_SIZE`: Connection pool size
//! - `TIDEMARK_QUEUE_CAPACITY`: Emitter queue capacity
//! - `TIDEMARK_BATCH_SIZE`: Emitter batch size
//! - `TIDEMARK_FLUSH_INTERVAL_MS`: Emitter flush interval in milliseconds
//! - `TIDEMARK_ROLLUP_INTERVAL_SECONDS`: Seconds between rollup cycles
//! - `TIDEMARK_ROLLUP_DELAY_HOURS`: Rollup settle delay in hours
//! - `TIDEMARK_CACHE_ENABLED`: Whether the counter cache is enabled
//! - `TIDEMARK_CACHE_TTL_SECONDS`: Counter cache expiry in seconds
//! - `TIDEMARK_RETENTION_RAW_DAYS`: Raw event retention in days

use std::path::{Path, PathBuf};

use tidemark_domain::{MetricsConfig, Result, TidemarkError};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `TidemarkError::Config` if configuration cannot be loaded from
/// either source.
pub fn load() -> Result<MetricsConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// `TIDEMARK_DB_PATH` must be present; every other variable overrides its
/// documented default when set.
///
/// # Errors
/// Returns `TidemarkError::Config` if the database path is missing or any
/// present variable has an invalid value.
pub fn load_from_env() -> Result<MetricsConfig> {
    let mut config = MetricsConfig::default();

    config.database.path = env_var("TIDEMARK_DB_PATH")?;
    if let Some(pool_size) = env_parse::<u32>("TIDEMARK_DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }

    if let Some(capacity) = env_parse::<usize>("TIDEMARK_QUEUE_CAPACITY")? {
        config.emitter.queue_capacity = capacity;
    }
    if let Some(batch_size) = env_parse::<usize>("TIDEMARK_BATCH_SIZE")? {
        config.emitter.batch_size = batch_size;
    }
    if let Some(flush_ms) = env_parse::<u64>("TIDEMARK_FLUSH_INTERVAL_MS")? {
        config.emitter.flush_interval_ms = flush_ms;
    }

    if let Some(interval) = env_parse::<u64>("TIDEMARK_ROLLUP_INTERVAL_SECONDS")? {
        config.rollup.interval_seconds = interval;
    }
    if let Some(delay) = env_parse::<i64>("TIDEMARK_ROLLUP_DELAY_HOURS")? {
        config.rollup.delay_hours = delay;
    }

    config.cache.enabled = env_bool("TIDEMARK_CACHE_ENABLED", config.cache.enabled);
    if let Some(ttl) = env_parse::<u64>("TIDEMARK_CACHE_TTL_SECONDS")? {
        config.cache.counter_ttl_seconds = ttl;
    }

    if let Some(raw_days) = env_parse::<i64>("TIDEMARK_RETENTION_RAW_DAYS")? {
        config.retention.raw_days = raw_days;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `TidemarkError::Config` if no file is found or parsing fails.
pub fn load_from_file(path: Option<PathBuf>) -> Result<MetricsConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TidemarkError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TidemarkError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TidemarkError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, format detected by extension.
fn parse_config(contents: &str, path: &Path) -> Result<MetricsConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TidemarkError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TidemarkError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(TidemarkError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file.
fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("tidemark.json"),
            cwd.join("tidemark.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("tidemark.json"),
                exe_dir.join("tidemark.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        TidemarkError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable, erroring only on bad values.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|e| {
            TidemarkError::Config(format!("Invalid value for {}: {}", key, e))
        }),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
