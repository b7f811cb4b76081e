use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body the tariff provider returns alongside non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub status: Option<u16>,
    pub body: Option<ProviderErrorBody>,
}

impl ProviderError {
    pub fn transport(detail: impl std::fmt::Display) -> Self {
        Self {
            message: format!("failed to fetch tariffs: {detail}"),
            status: None,
            body: None,
        }
    }

    /// Builds the error for a non-2xx response, preferring the provider's own `detail`.
    pub fn http(status: u16, text: &str) -> Self {
        let body = serde_json::from_str::<ProviderErrorBody>(text).ok();
        let detail = body
            .as_ref()
            .and_then(|b| b.detail.clone())
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));
        Self {
            message: format!("failed to fetch tariffs: {detail}"),
            status: Some(status),
            body,
        }
    }

    pub fn decode(detail: impl std::fmt::Display) -> Self {
        Self {
            message: format!("tariff response could not be decoded: {detail}"),
            status: None,
            body: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("field {field} has non-numeric value {value:?}")]
    InvalidNumeric { field: &'static str, value: String },

    #[error("invalid spreadsheet id {0:?}")]
    InvalidTarget(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("publish to {target} failed: {message}")]
pub struct PublishError {
    pub target: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
