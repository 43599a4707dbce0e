use crate::decoder::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing_error::SpanTrace;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelDetails {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
}

impl ModelDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            modified_at: None,
            details: None,
        }
    }
}

impl fmt::Display for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Body of `GET /api/tags`. A missing `models` key means no models.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelListing {
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

impl GenerationRequest {
    pub fn streaming(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    Connectivity,
    Decode,
    ModelNotInstalled,
    Busy,
    Cancelled,
    Internal,
}

#[derive(Error, Debug)]
pub enum MurmurError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upstream error (status {0}): {1}")]
    Upstream(reqwest::StatusCode, String),

    #[error("Server reported an error: {0}")]
    Server(String),

    #[error("Cannot connect to Ollama: {0}")]
    Unreachable(String),

    #[error("Stream stalled: no data received for {0:?}")]
    Stalled(Duration),

    #[error("Model \"{model}\" is not installed: {detail}")]
    ModelNotInstalled { model: String, detail: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("A generation is already in progress")]
    Busy,

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MurmurError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MurmurError::Validation(_) => ErrorCategory::Validation,
            MurmurError::Network(_)
            | MurmurError::Io(_)
            | MurmurError::Serialization(_)
            | MurmurError::Upstream(_, _)
            | MurmurError::Server(_)
            | MurmurError::Unreachable(_)
            | MurmurError::Stalled(_) => ErrorCategory::Connectivity,
            MurmurError::ModelNotInstalled { .. } => ErrorCategory::ModelNotInstalled,
            MurmurError::Decode(_) => ErrorCategory::Decode,
            MurmurError::Busy => ErrorCategory::Busy,
            MurmurError::Cancelled => ErrorCategory::Cancelled,
            MurmurError::Config(_) => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: MurmurError,
    pub span_trace: SpanTrace,
}

impl ObservedError {
    pub fn category(&self) -> ErrorCategory {
        self.inner.category()
    }
}

impl std::fmt::Display for ObservedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<MurmurError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_without_models_key_is_empty() {
        let listing: ModelListing = serde_json::from_str("{}").unwrap();
        assert!(listing.models.is_empty());
    }

    #[test]
    fn listing_ignores_unknown_fields() {
        let body = r#"{"models":[{"name":"mistral:7b","model":"mistral:7b","size":4109865159,
            "digest":"abc","details":{"family":"llama","parameter_size":"7B","quantization_level":"Q4_0"}}]}"#;
        let listing: ModelListing = serde_json::from_str(body).unwrap();
        assert_eq!(listing.models.len(), 1);
        assert_eq!(listing.models[0].name, "mistral:7b");
        assert_eq!(listing.models[0].size, Some(4109865159));
        let details = listing.models[0].details.clone().unwrap_or_default();
        assert_eq!(details.parameter_size.as_deref(), Some("7B"));
    }

    #[test]
    fn generation_request_serializes_stream_flag() {
        let req = GenerationRequest::streaming("llama2", "hi");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, serde_json::json!({"model": "llama2", "prompt": "hi", "stream": true}));
    }

    #[test]
    fn observed_error_keeps_category() {
        let err: ObservedError = MurmurError::Stalled(Duration::from_secs(1)).into();
        assert_eq!(err.category(), ErrorCategory::Connectivity);
        let err: ObservedError = MurmurError::Busy.into();
        assert_eq!(err.category(), ErrorCategory::Busy);
    }
}
