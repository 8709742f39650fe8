use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ingestion::pipeline::DEFAULT_PAGE_SIZE;
use crate::ingestion::{PipelineConfig, RetryPolicy, MAX_RETRIES};
use crate::polymarket::{DEFAULT_FETCH_TIMEOUT, GAMMA_API_BASE};
use crate::services::health_monitor::DEFAULT_RECENT_ISSUES;
use crate::services::DEFAULT_POLL_INTERVAL;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Required unless the in-memory store is selected.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,

    // Gamma API
    pub gamma_api_url: String,
    pub fetch_page_size: u32,
    pub fetch_timeout_secs: u64,
    pub fetch_max_retries: u32,
    pub retry_base_delay_ms: u64,

    // Scheduling
    pub poll_interval_secs: u64,

    // Monitoring
    pub run_log_path: PathBuf,
    pub status_export_path: PathBuf,
    pub recent_issue_limit: usize,
    pub log_format: LogFormat,

    /// Bearer token for control routes; unset leaves them open.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_var("PORT", 8080)?,

            gamma_api_url: env::var("GAMMA_API_URL").unwrap_or_else(|_| GAMMA_API_BASE.into()),
            fetch_page_size: parse_var("FETCH_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT.as_secs())?,
            fetch_max_retries: parse_var("FETCH_MAX_RETRIES", MAX_RETRIES)?,
            retry_base_delay_ms: parse_var("RETRY_BASE_DELAY_MS", 1_000)?,

            poll_interval_secs: parse_var("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL.as_secs())?,

            run_log_path: env::var("RUN_LOG_PATH")
                .unwrap_or_else(|_| "logs/pipeline_runs.log".into())
                .into(),
            status_export_path: env::var("STATUS_EXPORT_PATH")
                .unwrap_or_else(|_| "logs/pipeline_status.json".into())
                .into(),
            recent_issue_limit: parse_var("RECENT_ISSUE_LIMIT", DEFAULT_RECENT_ISSUES)?,
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },

            api_token: env::var("API_TOKEN").ok().filter(|s| !s.is_empty()),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            page_size: self.fetch_page_size,
            retry: RetryPolicy {
                max_attempts: self.fetch_max_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
            },
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read `key`, falling back to `default` when unset; a set-but-invalid value
/// is an error rather than a silent default.
fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        _ => Ok(default),
    }
}
