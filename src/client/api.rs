//! Blocking HTTP client for the classification service.
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use super::types::{AnalysisResponse, AnalyzeRequest, HealthStatus, ModelList};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("invalid API key")]
    Unauthorized,

    #[error("access denied")]
    Forbidden,

    #[error("ML model not available")]
    Unavailable,

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response from service: {0}")]
    InvalidResponse(String),

    #[error("could not set up the HTTP client: {0}")]
    Setup(String),
}

impl ClientError {
    /// What the user can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            ClientError::Connection { .. } => "Check that the API URL is correct and the service is reachable.",
            ClientError::Timeout { .. } => "The service is slow or unreachable; try again or analyse fewer records.",
            ClientError::Unauthorized => "Get a valid API key from your admin.",
            ClientError::Forbidden => "Check your API key permissions.",
            ClientError::Unavailable => "Contact your admin to train the model.",
            ClientError::Status { .. } => "See the service response above.",
            ClientError::InvalidResponse(_) => "The service answered with something this client does not understand.",
            ClientError::Setup(_) => "Check the local TLS and proxy configuration.",
        }
    }

    /// Maps a non-success status to its error kind.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            StatusCode::FORBIDDEN => ClientError::Forbidden,
            StatusCode::SERVICE_UNAVAILABLE => ClientError::Unavailable,
            other => ClientError::Status {
                status: other.as_u16(),
                body: body.chars().take(200).collect(),
            },
        }
    }
}

/// Per-endpoint request timeouts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeouts {
    pub health: Duration,
    pub models: Duration,
    pub analyze: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            health: Duration::from_secs(5),
            models: Duration::from_secs(10),
            analyze: Duration::from_secs(300),
        }
    }
}

pub struct ThreatClient {
    api_url: String,
    api_key: String,
    timeouts: Timeouts,
    http: Client,
}

/// Adds `https://` when no scheme is given and drops trailing slashes.
pub fn normalize_url(api_url: &str) -> String {
    let api_url = api_url.trim();
    let with_scheme = if api_url.starts_with("http") {
        api_url.to_string()
    } else {
        format!("https://{api_url}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

impl ThreatClient {
    pub fn new(api_url: &str, api_key: &str, timeouts: Timeouts) -> Result<Self, ClientError> {
        let http = Client::builder()
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;
        Ok(Self {
            api_url: normalize_url(api_url),
            api_key: api_key.to_string(),
            timeouts,
            http,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `GET /health`, unauthenticated.
    pub fn health(&self) -> Result<HealthStatus, ClientError> {
        let url = format!("{}/health", self.api_url);
        log::info!("Checking {url}");
        let request = self.http.get(&url);
        self.send(request, &url, self.timeouts.health)
    }

    /// `GET /models`.
    pub fn models(&self) -> Result<ModelList, ClientError> {
        let url = format!("{}/models", self.api_url);
        log::info!("Listing models at {url}");
        let request = self.http.get(&url).bearer_auth(&self.api_key);
        self.send(request, &url, self.timeouts.models)
    }

    /// `POST /analyze`. Never retried. The untouched body is kept next to the typed
    /// result so it can be saved verbatim.
    pub fn analyze(&self, body: &AnalyzeRequest) -> Result<AnalysisResponse, ClientError> {
        let url = format!("{}/analyze", self.api_url);
        log::info!(
            "Submitting {} records to {url} (llm: {})",
            body.network_data.len(),
            body.use_llm
        );
        let request = self.http.post(&url).bearer_auth(&self.api_key).json(body);
        let raw: serde_json::Value = self.send(request, &url, self.timeouts.analyze)?;
        AnalysisResponse::from_raw(raw).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str, timeout: Duration) -> Result<T, ClientError> {
        let response = request
            .timeout(timeout)
            .send()
            .map_err(|e| transport_error(e, url, timeout))?;
        decode(response, url, timeout)
    }
}

fn decode<T: DeserializeOwned>(response: Response, url: &str, timeout: Duration) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        log::warn!("{url} answered {status}");
        return Err(ClientError::from_status(status, body));
    }

    let body = response.text().map_err(|e| transport_error(e, url, timeout))?;
    serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

fn transport_error(err: reqwest::Error, url: &str, timeout: Duration) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else if err.is_connect() {
        ClientError::Connection {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else {
        ClientError::InvalidResponse(err.to_string())
    }
}
