use crate::constants::{GENERATE_PATH, TAGS_PATH};
use crate::types::{GenerationRequest, ModelDescriptor, ModelListing, MurmurError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// Raw body of a generation response, chunk by chunk. Single pass.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send>>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>>;

    async fn generate(&self, request: &GenerationRequest) -> Result<ByteStream>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub list_timeout: Duration,
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    list_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
            .map_err(MurmurError::Network)?;

        tracing::info!("Ollama endpoint: {}", base_url);
        Ok(Self {
            client,
            base_url,
            list_timeout: config.list_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn upstream_error(response: reqwest::Response) -> MurmurError {
        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(_) => "Failed to read error body".to_string(),
        };
        MurmurError::Upstream(status, extract_error_message(&body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        let url = self.url(TAGS_PATH);
        tracing::debug!("[⚙️  -> ☁️ ] GET {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.list_timeout)
            .send()
            .await
            .map_err(MurmurError::Network)?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await.into());
        }

        let body = response.bytes().await.map_err(MurmurError::Network)?;
        let listing: ModelListing = serde_json::from_slice(&body)?;
        tracing::info!("[☁️  -> ⚙️ ] Model listing returned {} models", listing.models.len());
        Ok(listing.models)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<ByteStream> {
        let url = self.url(GENERATE_PATH);
        tracing::debug!(
            "[⚙️  -> ☁️ ] POST {} (model: {}, prompt: {} chars)",
            url,
            request.model,
            request.prompt.chars().count()
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(MurmurError::Network)?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await.into());
        }

        let bytes_stream = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other));
        Ok(Box::pin(bytes_stream))
    }
}

/// Ollama wraps failures as `{"error": "..."}`; fall back to the raw body.
fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) => match v.get("error").and_then(|e| e.as_str()) {
            Some(msg) => msg.to_string(),
            None => body.trim().to_string(),
        },
        Err(_) => body.trim().to_string(),
    }
}

/// Accepts the same shapes as `OLLAMA_HOST`: `host:port`, a full URL, with or
/// without a trailing `/` or `/api`.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MurmurError::Config("Ollama host is empty".into()).into());
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.contains("://") {
        return Err(MurmurError::Config(format!("Unsupported URL scheme in {}", trimmed)).into());
    } else {
        format!("http://{}", trimmed)
    };

    let mut base = with_scheme.trim_end_matches('/').to_string();
    if let Some(stripped) = base.strip_suffix("/api") {
        base = stripped.to_string();
    }
    Ok(base)
}
