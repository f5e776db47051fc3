//! Layered configuration: environment first, CLI flags overlay (§4.9, §4.11).
//!
//! A single [`Config`] is built once at startup and handed around behind an
//! `Arc`; nothing after `main` re-reads the environment.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const MIN_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
const MIN_API_TIMEOUT_SECS: u64 = 5;
const DEFAULT_KDF_ITERATIONS: u32 = 310_000;
const MIN_KDF_ITERATIONS: u32 = 10_000;

/// Validated, defaulted process configuration.
///
/// `Debug` is hand-written so `password` and `db_encryption_key` never land
/// in a log line by accident.
pub struct Config {
    /// Account username, required.
    pub username: String,
    /// Account password, required. Never logged.
    pub password: String,
    /// Optional passphrase enabling an encrypted cache.
    pub db_encryption_key: Option<String>,
    /// KDF iteration count for the encrypted cache, clamped to a floor.
    pub db_encryption_kdf_iterations: u32,
    /// Interval between sync cycles, clamped to a floor.
    pub sync_interval: Duration,
    /// Per-request HTTP timeout, clamped to a floor.
    pub api_timeout: Duration,
    /// Minimum level the tracing subscriber emits.
    pub log_level: tracing::Level,
    /// Optional path for a non-blocking file log sink.
    pub log_file_path: Option<PathBuf>,
    /// Directory the cache file (and WAL/SHM siblings) live under.
    pub cache_dir: PathBuf,
    /// Base URL for the authorize endpoint.
    pub auth_base_url: String,
    /// Base URL for the index/fetch/save endpoints.
    pub data_base_url: String,
    /// Static application identifier sent on the auth path.
    pub app_id: String,
    /// Static application key sent on every request.
    pub app_key: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field(
                "db_encryption_key",
                &self.db_encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "db_encryption_kdf_iterations",
                &self.db_encryption_kdf_iterations,
            )
            .field("sync_interval", &self.sync_interval)
            .field("api_timeout", &self.api_timeout)
            .field("log_level", &self.log_level)
            .field("log_file_path", &self.log_file_path)
            .field("cache_dir", &self.cache_dir)
            .field("auth_base_url", &self.auth_base_url)
            .field("data_base_url", &self.data_base_url)
            .field("app_id", &self.app_id)
            .finish()
    }
}

impl Config {
    /// Build configuration from the process environment, per §6.
    pub fn from_env() -> Result<Self> {
        let username = require_env("USERNAME")?;
        let password = require_env("PASSWORD")?;

        let db_encryption_key = std::env::var("DB_ENCRYPTION_KEY").ok().filter(|s| !s.is_empty());

        let db_encryption_kdf_iterations = clamp_u32(
            parse_env_or("DB_ENCRYPTION_KDF_ITERATIONS", DEFAULT_KDF_ITERATIONS)?,
            MIN_KDF_ITERATIONS,
            "DB_ENCRYPTION_KDF_ITERATIONS",
        );

        let sync_interval_secs = clamp_u64(
            parse_env_or("SYNC_INTERVAL_SECONDS", DEFAULT_SYNC_INTERVAL_SECS)?,
            MIN_SYNC_INTERVAL_SECS,
            "SYNC_INTERVAL_SECONDS",
        );

        let api_timeout_secs = clamp_u64(
            parse_env_or("API_TIMEOUT_SECONDS", DEFAULT_API_TIMEOUT_SECS)?,
            MIN_API_TIMEOUT_SECS,
            "API_TIMEOUT_SECONDS",
        );

        let log_level = parse_log_level(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        )?;

        let log_file_path = std::env::var("LOG_FILE_PATH").ok().map(PathBuf::from);

        let cache_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("notecache-bridge");

        Ok(Self {
            username,
            password,
            db_encryption_key,
            db_encryption_kdf_iterations,
            sync_interval: Duration::from_secs(sync_interval_secs),
            api_timeout: Duration::from_secs(api_timeout_secs),
            log_level,
            log_file_path,
            cache_dir,
            auth_base_url: std::env::var("AUTH_BASE_URL")
                .unwrap_or_else(|_| "https://api.simperium.com".to_string()),
            data_base_url: std::env::var("DATA_BASE_URL")
                .unwrap_or_else(|_| "https://api.simperium.com/1".to_string()),
            app_id: std::env::var("APP_ID").unwrap_or_else(|_| "notecache".to_string()),
            app_key: std::env::var("APP_KEY").unwrap_or_default(),
        })
    }

    /// Path of the main cache file for the current owner (derived in
    /// `cache::store`, which also appends `-wal`/`-shm` siblings).
    pub fn cache_file_path(&self, owner_identity_hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{owner_identity_hash}.sqlite3"))
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Config(format!("missing required environment variable {key}")))
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|e| Error::Config(format!("invalid {key}: {e}"))),
        _ => Ok(default),
    }
}

fn clamp_u64(value: u64, min: u64, key: &str) -> u64 {
    if value < min {
        tracing::warn!(key, value, min, "configuration value below minimum, clamping");
        min
    } else {
        value
    }
}

fn clamp_u32(value: u32, min: u32, key: &str) -> u32 {
    if value < min {
        tracing::warn!(key, value, min, "configuration value below minimum, clamping");
        min
    } else {
        value
    }
}

fn parse_log_level(raw: String) -> Result<tracing::Level> {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => Ok(tracing::Level::TRACE),
        "debug" => Ok(tracing::Level::DEBUG),
        "info" => Ok(tracing::Level::INFO),
        "warn" => Ok(tracing::Level::WARN),
        "error" | "fatal" => Ok(tracing::Level::ERROR),
        other => Err(Error::Config(format!("invalid LOG_LEVEL: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "USERNAME",
            "PASSWORD",
            "DB_ENCRYPTION_KEY",
            "DB_ENCRYPTION_KDF_ITERATIONS",
            "SYNC_INTERVAL_SECONDS",
            "API_TIMEOUT_SECONDS",
            "LOG_LEVEL",
            "LOG_FILE_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_key_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_and_clamping_apply() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("USERNAME", "alice");
        std::env::set_var("PASSWORD", "hunter2");
        std::env::set_var("SYNC_INTERVAL_SECONDS", "1");
        std::env::set_var("API_TIMEOUT_SECONDS", "1");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.sync_interval, Duration::from_secs(MIN_SYNC_INTERVAL_SECS));
        assert_eq!(cfg.api_timeout, Duration::from_secs(MIN_API_TIMEOUT_SECS));
        assert_eq!(cfg.db_encryption_kdf_iterations, DEFAULT_KDF_ITERATIONS);
        assert_eq!(format!("{:?}", cfg).contains("hunter2"), false);
        clear_env();
    }
}
