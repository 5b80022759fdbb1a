use reqwest::{Client, StatusCode, Url, header::USER_AGENT};
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::{info, warn};

use crate::site::data::{NavigationUrl, Service};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const CLIENT_USER_AGENT: &str = "webguide/0.1.0";

/// Errors of an outbound query-service call. Only the transient classes are
/// retried; a missing section is a valid answer and surfaces immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    Timeout,
    Transport(String),
    HttpStatus { status: u16, body: String },
    SectionNotFound { section: String },
    Parse(String),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Transport(_) | Self::HttpStatus { .. }
        )
    }
}

impl Display for ToolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "website API request timed out"),
            Self::Transport(msg) => write!(f, "website API transport error: {msg}"),
            Self::HttpStatus { status, body } => {
                write!(f, "website API request failed with status {status}: {body}")
            }
            Self::SectionNotFound { section } => {
                write!(f, "no navigation section named '{section}'")
            }
            Self::Parse(msg) => write!(f, "website API returned an unexpected payload: {msg}"),
        }
    }
}

impl Error for ToolError {}

/// HTTP client for the Navigation Query Service. The base URL is an explicit
/// construction-time value, not an ambient lookup.
#[derive(Debug, Clone)]
pub struct WebsiteApiClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    max_attempts: u32,
}

impl WebsiteApiClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn fetch_services(&self) -> Result<Vec<Service>, ToolError> {
        let url = format!("{}/website/services", self.base_url);
        self.get_json(&url, None).await
    }

    pub async fn fetch_navigation(&self, section: &str) -> Result<NavigationUrl, ToolError> {
        // The section comes from model-generated arguments, so it must travel
        // as a single percent-encoded path segment. Raw interpolation would
        // let '#' or '?' rewrite the request into a lookup for a different key.
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| ToolError::Transport(format!("invalid base URL: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| ToolError::Transport("base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["website", "navigation", section]);
        self.get_json(url.as_str(), Some(section)).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        section: Option<&str>,
    ) -> Result<T, ToolError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(%url, attempt, "website API request");
            match self.try_get(url, section).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(%url, attempt, error = %err, "website API request failed, retrying");
                }
                Err(err) => {
                    warn!(%url, attempt, error = %err, "website API request failed");
                    return Err(err);
                }
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(
        &self,
        url: &str,
        section: Option<&str>,
    ) -> Result<T, ToolError> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ToolError::Timeout
                } else {
                    ToolError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND
            && let Some(section) = section
        {
            return Err(ToolError::SectionNotFound {
                section: section.to_string(),
            });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            let body = body.chars().take(400).collect::<String>();
            return Err(ToolError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(|err| {
            if err.is_timeout() {
                ToolError::Timeout
            } else {
                ToolError::Parse(err.to_string())
            }
        })
    }
}
