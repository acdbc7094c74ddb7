//! Client for the alerting REST backend.
//!
//! Reads full collection snapshots and applies the one mutation this service performs on
//! behalf of the dashboards (terminating an alert).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;

use crate::errors::AppError;
use crate::models::{CollectionKind, Record};

/// Why a backend call failed.
#[derive(Debug)]
pub enum FetchError {
    /// Connection refused, timeout, broken body stream
    Transport(String),
    /// Resource does not exist
    NotFound(String),
    /// Any other non-success status
    Status { url: String, status: u16 },
    /// Body was not the expected JSON
    Malformed { url: String, message: String },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "transport error: {}", msg),
            FetchError::NotFound(url) => write!(f, "{} returned 404", url),
            FetchError::Status { url, status } => write!(f, "{} returned HTTP {}", url, status),
            FetchError::Malformed { url, message } => {
                write!(f, "malformed response from {}: {}", url, message)
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Source of collection snapshots.
#[async_trait]
pub trait CollectionFetcher: Send + Sync {
    /// Read the full current snapshot of `kind`.
    async fn fetch(&self, kind: CollectionKind) -> Result<Vec<Record>, FetchError>;
}

/// HTTP client for the backend's `/api/alertes/` and `/api/annonces/` collections.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn collection_url(&self, kind: CollectionKind) -> String {
        format!("{}/api/{}/", self.base_url, kind.endpoint())
    }

    fn record_url(&self, kind: CollectionKind, id: i64) -> String {
        format!("{}/api/{}/{}/", self.base_url, kind.endpoint(), id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Mark an alert as finished (`statut = termine`) and return the updated record.
    pub async fn terminate_alert(&self, id: i64) -> Result<Record, FetchError> {
        let url = self.record_url(CollectionKind::Alerts, id);
        let request = self
            .client
            .patch(&url)
            .json(&json!({ "statut": "termine" }));

        tracing::info!(alert_id = id, "Terminating alert");
        self.send_json(&url, self.authorize(request)).await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(format!("{}: {}", url, e)))?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl CollectionFetcher for BackendClient {
    async fn fetch(&self, kind: CollectionKind) -> Result<Vec<Record>, FetchError> {
        let url = self.collection_url(kind);
        let request = self.authorize(self.client.get(&url));
        let records: Vec<Record> = self.send_json(&url, request).await?;
        tracing::debug!(%kind, count = records.len(), "Fetched collection snapshot");
        Ok(records)
    }
}
