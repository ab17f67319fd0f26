//! Ollama HTTP API client
//!
//! The read-only endpoints used to check that a daemon is up, plus
//! streaming chat for a model smoke test.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::chat::{ChatMessage, ChatRequest, LineBuffer, decode_chat_line};
use crate::config::ClientConfig;
use crate::error::{OllamaError, Result};

/// A model available in the local runtime
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// A running Ollama daemon
#[async_trait]
pub trait RuntimeApi: Send + Sync {
    /// Daemon version string (e.g. "0.5.7")
    async fn version(&self) -> Result<String>;

    /// Models pulled into the local runtime
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Send a conversation to `model`, passing each text chunk to `on_chunk`
    /// as it arrives. Returns the whole reply.
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String>;

    /// Base URL used for display
    fn base_url(&self) -> &str;
}

/// [`RuntimeApi`] over HTTP
pub struct HttpRuntime {
    base_url: String,
    client: Client,
    chat_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

impl HttpRuntime {
    /// Create a client for the configured daemon
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OllamaError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
            chat_timeout: config.chat_timeout,
        })
    }

    fn unreachable(&self, e: reqwest::Error) -> OllamaError {
        OllamaError::Unreachable {
            base_url: self.base_url.clone(),
            message: e.to_string(),
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OllamaError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| OllamaError::Decode {
                endpoint: path.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl RuntimeApi for HttpRuntime {
    async fn version(&self) -> Result<String> {
        let body = self.get_json("/api/version").await?;
        let parsed: VersionResponse =
            serde_json::from_value(body).map_err(|e| OllamaError::Decode {
                endpoint: "/api/version".to_string(),
                message: e.to_string(),
            })?;
        Ok(parsed.version)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let body = self.get_json("/api/tags").await?;
        decode_models(body)
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        log::debug!("POST {} (model {})", url, model);

        let request = ChatRequest {
            model,
            messages,
            stream: true,
        };
        let response = self
            .client
            .post(&url)
            .timeout(self.chat_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let response = Self::check_status(response).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut reply = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| OllamaError::Stream(e.to_string()))?;
            lines.push(&chunk);
            while let Some(line) = lines.next_line() {
                emit_line(&line, on_chunk, &mut reply)?;
            }
        }
        if let Some(line) = lines.finish() {
            emit_line(&line, on_chunk, &mut reply)?;
        }

        log::debug!("Chat reply from {}: {} bytes", model, reply.len());
        Ok(reply)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn emit_line(
    line: &[u8],
    on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    reply: &mut String,
) -> Result<()> {
    if let Some(text) = decode_chat_line(line)? {
        on_chunk(&text);
        reply.push_str(&text);
    }
    Ok(())
}

/// Decode a `/api/tags` body.
///
/// Current daemons answer `{"models": [...]}`; older ones used `{"tags": [...]}`
/// and some proxies return the bare list.
pub fn decode_models(body: Value) -> Result<Vec<ModelInfo>> {
    let list = match body {
        Value::Array(list) => Value::Array(list),
        Value::Object(mut map) => match map.remove("models").or_else(|| map.remove("tags")) {
            Some(list) => list,
            None => {
                return Err(OllamaError::Decode {
                    endpoint: "/api/tags".to_string(),
                    message: "missing \"models\" field".to_string(),
                });
            }
        },
        other => {
            return Err(OllamaError::Decode {
                endpoint: "/api/tags".to_string(),
                message: format!("expected object or list, got {}", other),
            });
        }
    };

    serde_json::from_value(list).map_err(|e| OllamaError::Decode {
        endpoint: "/api/tags".to_string(),
        message: e.to_string(),
    })
}
