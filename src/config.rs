//! Environment-backed configuration.
//!
//! Mirrors the flags of the original CLI as environment variables (loadable
//! from a `.env` file via dotenvy):
//!
//! | Variable | Default |
//! |---|---|
//! | `POOL_DEFAULT_MIN` | `0` |
//! | `POOL_DEFAULT_MAX` | `2` |
//! | `POOL_DEFAULT_IDLE_TIMEOUT_MILLIS` | `5000` |
//! | `POOL_DEFAULT_EVICTION_RUN_INTERVAL_MILLIS` | `5000` |
//! | `POOL_DEFAULT_ACQUIRE_TIMEOUT_MILLIS` | `30000` |
//! | `HOST` | `127.0.0.1` |
//! | `PORT` | `8884` |
//! | `HTTP_INPUT_OPTIONS_FIELD` | `options` |
//! | `HTTP_INPUT_FILE_FIELD` | `file` |
//! | `HTTP_ENDPOINT_STATUS_ENABLE` | `true` |
//! | `PROCESSOR_LINE_ENDINGS` | `auto` |
//! | `TESSERACT_BIN_PATH` | `tesseract` |
//! | `OCR_JOB_TIMEOUT_MILLIS` | `60000` |

use std::str::FromStr;
use std::time::Duration;

use crate::pool::{PoolConfig, PoolConfigError};
use crate::processor::LineEndings;

#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub pool: PoolConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Multipart field carrying the OCR options JSON.
    pub options_field: String,
    /// Multipart field carrying the image.
    pub file_field: String,
    pub status_enable: bool,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub bin: String,
    pub job_timeout: Duration,
    pub line_endings: LineEndings,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error(transparent)]
    Pool(#[from] PoolConfigError),
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load and validate configuration. Pool bounds are checked here so an
    /// unusable pool (`max = 0`, `max < min`) never reaches the registry.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pool = PoolConfig {
            min: env_parse("POOL_DEFAULT_MIN", 0)?,
            max: env_parse("POOL_DEFAULT_MAX", 2)?,
            idle_timeout: Duration::from_millis(env_parse(
                "POOL_DEFAULT_IDLE_TIMEOUT_MILLIS",
                5_000u64,
            )?),
            eviction_run_interval: Duration::from_millis(env_parse(
                "POOL_DEFAULT_EVICTION_RUN_INTERVAL_MILLIS",
                5_000u64,
            )?),
            acquire_timeout: Duration::from_millis(env_parse(
                "POOL_DEFAULT_ACQUIRE_TIMEOUT_MILLIS",
                30_000u64,
            )?),
        };
        pool.validate()?;

        Ok(Self {
            http: HttpConfig {
                host: env_string("HOST", "127.0.0.1"),
                port: env_parse("PORT", 8884)?,
                options_field: env_string("HTTP_INPUT_OPTIONS_FIELD", "options"),
                file_field: env_string("HTTP_INPUT_FILE_FIELD", "file"),
                status_enable: env_parse("HTTP_ENDPOINT_STATUS_ENABLE", true)?,
            },
            pool,
            ocr: OcrConfig {
                bin: env_string("TESSERACT_BIN_PATH", "tesseract"),
                job_timeout: Duration::from_millis(env_parse(
                    "OCR_JOB_TIMEOUT_MILLIS",
                    60_000u64,
                )?),
                line_endings: env_parse("PROCESSOR_LINE_ENDINGS", LineEndings::Auto)?,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                host: "127.0.0.1".to_string(),
                port: 8884,
                options_field: "options".to_string(),
                file_field: "file".to_string(),
                status_enable: true,
            },
            pool: PoolConfig::default(),
            ocr: OcrConfig {
                bin: "tesseract".to_string(),
                job_timeout: Duration::from_millis(60_000),
                line_endings: LineEndings::Auto,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_flags() {
        let config = Config::default();
        assert_eq!(config.pool.min, 0);
        assert_eq!(config.pool.max, 2);
        assert_eq!(config.pool.idle_timeout, Duration::from_millis(5_000));
        assert_eq!(
            config.pool.eviction_run_interval,
            Duration::from_millis(5_000)
        );
        assert_eq!(config.http.port, 8884);
        assert_eq!(config.http.options_field, "options");
        assert_eq!(config.http.file_field, "file");
        assert!(config.pool.validate().is_ok());
    }
}
