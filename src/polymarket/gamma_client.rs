use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;

pub const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("unexpected status: {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Only network-layer failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Connect(_) | FetchError::Timeout(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() || is_dropped_connection(&e) {
            FetchError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else if e.is_request() {
            // The request went out but no response came back.
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Http(e.to_string())
        }
    }
}

/// True when the peer reset or closed the connection before a full response
/// arrived, anywhere in the error's source chain.
fn is_dropped_connection(e: &reqwest::Error) -> bool {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        // hyper reports these without exposing an io::Error.
        let text = err.to_string();
        if text.contains("connection closed before message completed")
            || text.contains("incomplete message")
        {
            return true;
        }
        source = err.source();
    }
    false
}

/// One attempt at fetching a page of raw market payloads.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_page(&self, limit: u32) -> Result<Vec<Value>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct GammaClient {
    http: Client,
    base_url: String,
}

impl GammaClient {
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
                Client::new()
            });

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch one page of active markets as untyped JSON objects.
    pub async fn get_active_markets(&self, limit: u32) -> Result<Vec<Value>, FetchError> {
        let url = Url::parse_with_params(
            &format!("{}/markets", self.base_url),
            &[("limit", limit.to_string()), ("active", "true".to_string())],
        )
        .map_err(|e| FetchError::Http(format!("invalid URL: {e}")))?;

        let resp = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        match body {
            Value::Array(markets) => Ok(markets),
            other => Err(FetchError::Malformed(format!(
                "expected a JSON array, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

#[async_trait]
impl MarketSource for GammaClient {
    async fn fetch_page(&self, limit: u32) -> Result<Vec<Value>, FetchError> {
        self.get_active_markets(limit).await
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
