//! Shared HTTP plumbing for adapters and the tenant directory.
//!
//! Every failure is classified once, here: no response or a non-2xx status
//! becomes [`AppError::Transport`] (or [`AppError::Timeout`]), an unreadable
//! or unparsable 2xx body becomes [`AppError::Decode`]. Requests are never
//! retried.
//!
//! URLs in errors have their credential query parameters masked, since error
//! text ends up in stored failure reasons and logs.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tally_core::error::AppError;
use tally_core::traits::{FetchRequest, Method};
use tally_core::HttpConfig;

/// Maximum number of characters of a response body kept in error messages.
const EXCERPT_LEN: usize = 500;

/// Query parameters carrying SUSHI credentials, compared case-insensitively.
const SECRET_PARAMS: &[&str] = &["apikey", "api_key", "requestorid", "requestor_id"];

const REDACTED: &str = "REDACTED";

/// Thin wrapper over a configured [`reqwest::Client`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Builds a client with the configured user agent and timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, AppError> {
        let timeout = config.timeout();
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Executes a request and returns the body of a 2xx response.
    pub async fn execute(&self, request: &FetchRequest) -> Result<String, AppError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.as_str()),
            Method::Post => self.client.post(request.url.as_str()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let url = redact_url(&request.url);
        let resp = builder.send().await.map_err(|e| self.transport_error(&url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                excerpt(&body)
            };
            return Err(AppError::Transport {
                url,
                status: Some(status.as_u16()),
                message,
            });
        }

        resp.text().await.map_err(|e| AppError::Decode {
            message: e.without_url().to_string(),
            url,
        })
    }

    /// GETs a URL and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<T, AppError> {
        let mut request = FetchRequest::get(url.as_str()).with_header("Accept", "application/json");
        request.headers.extend(headers.iter().cloned());

        let body = self.execute(&request).await?;
        serde_json::from_str(&body).map_err(|e| AppError::Decode {
            url: redact_url(url.as_str()),
            message: e.to_string(),
        })
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> AppError {
        let e = e.without_url();
        if e.is_timeout() {
            AppError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else if e.is_connect() {
            AppError::Transport {
                url: url.to_string(),
                status: None,
                message: format!("Connection failed: {}", e),
            }
        } else {
            AppError::Transport {
                url: url.to_string(),
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }
}

/// Parses a configured URL.
pub(crate) fn parse_url(raw: &str) -> Result<Url, AppError> {
    Url::parse(raw.trim()).map_err(|_| AppError::InvalidUrl(raw.to_string()))
}

/// Masks credential query parameters so a URL can be logged and stored.
///
/// Unparsable input loses its whole query string.
pub(crate) fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.split('?').next().unwrap_or_default().to_string();
    };
    if url.query().is_none() {
        return url.into();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if SECRET_PARAMS.iter().any(|s| name.eq_ignore_ascii_case(s)) {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(&pairs);
    url.into()
}

/// Truncates a body for use in error messages.
pub(crate) fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
