//! Mock runtime for testing
//!
//! Lets callers exercise health-check paths without a running daemon.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::chat::ChatMessage;
use crate::client::{ModelInfo, RuntimeApi};
use crate::error::{OllamaError, Result};

/// A scripted [`RuntimeApi`]
pub struct MockRuntime {
    /// None = daemon unreachable
    version: Option<String>,
    models: Vec<ModelInfo>,
    /// Chunks streamed back by `chat_stream`
    reply: Vec<String>,
    call_count: AtomicUsize,
}

impl MockRuntime {
    /// A daemon that answers with the given version and models
    pub fn healthy(version: &str, models: &[&str]) -> Self {
        Self {
            version: Some(version.to_string()),
            models: models
                .iter()
                .map(|name| ModelInfo {
                    name: name.to_string(),
                    size: None,
                    modified_at: None,
                })
                .collect(),
            reply: Vec::new(),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Stream these chunks from `chat_stream`
    pub fn with_reply(mut self, chunks: &[&str]) -> Self {
        self.reply = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// A daemon that cannot be contacted
    pub fn unreachable() -> Self {
        Self {
            version: None,
            models: Vec::new(),
            reply: Vec::new(),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of API calls made
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn unreachable_error(&self) -> OllamaError {
        OllamaError::Unreachable {
            base_url: self.base_url().to_string(),
            message: "connection refused (mock)".to_string(),
        }
    }
}

#[async_trait]
impl RuntimeApi for MockRuntime {
    async fn version(&self) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.version.clone().ok_or_else(|| self.unreachable_error())
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        match self.version {
            Some(_) => Ok(self.models.clone()),
            None => Err(self.unreachable_error()),
        }
    }

    async fn chat_stream(
        &self,
        model: &str,
        _messages: &[ChatMessage],
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.version.is_none() {
            return Err(self.unreachable_error());
        }
        if !self.models.iter().any(|m| m.name == model) {
            return Err(OllamaError::Api {
                status: 404,
                message: format!("model \"{}\" not found, try pulling it first", model),
            });
        }

        for chunk in &self.reply {
            on_chunk(chunk);
        }
        Ok(self.reply.concat())
    }

    fn base_url(&self) -> &str {
        "http://mock:11434"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthy() {
        let runtime = MockRuntime::healthy("0.5.7", &["llama3.2"]);
        assert_eq!(runtime.version().await.unwrap(), "0.5.7");
        assert_eq!(runtime.list_models().await.unwrap().len(), 1);
        assert_eq!(runtime.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let runtime = MockRuntime::unreachable();
        assert!(runtime.version().await.unwrap_err().is_unreachable());
        assert!(runtime.list_models().await.is_err());
    }

    #[tokio::test]
    async fn test_chat_stream() {
        let runtime = MockRuntime::healthy("0.5.7", &["llama3.2"]).with_reply(&["Hi", " there"]);
        let mut chunks = Vec::new();
        let mut collect = |chunk: &str| chunks.push(chunk.to_string());

        let reply = runtime
            .chat_stream("llama3.2", &[ChatMessage::user("hello")], &mut collect)
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");
        assert_eq!(chunks, vec!["Hi", " there"]);

        let mut ignore = |_: &str| {};
        let err = runtime
            .chat_stream("mistral", &[ChatMessage::user("hello")], &mut ignore)
            .await
            .unwrap_err();
        assert!(matches!(err, OllamaError::Api { status: 404, .. }));
    }
}
