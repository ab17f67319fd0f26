use std::time::Duration;

use crate::error::{OllamaError, Result};

/// Address the Ollama daemon listens on out of the box.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Environment variable that overrides the daemon address.
pub const BASE_URL_ENV: &str = "OLLAMA_BASE_URL";

/// Connection settings for the Ollama HTTP API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Longer limit for `/api/chat`, which streams while the model generates
    pub chat_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            chat_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Resolve the base URL: environment first, then the configured value,
    /// then the built-in default.
    pub fn resolve(configured: Option<&str>) -> Result<Self> {
        let env = std::env::var(BASE_URL_ENV).ok();
        Self::resolve_from(env.as_deref(), configured)
    }

    /// Same as [`ClientConfig::resolve`] with the environment value passed in.
    pub fn resolve_from(env: Option<&str>, configured: Option<&str>) -> Result<Self> {
        let raw = env
            .filter(|s| !s.trim().is_empty())
            .or(configured)
            .unwrap_or(DEFAULT_BASE_URL);

        Ok(Self {
            base_url: normalize_base_url(raw)?,
            ..Self::default()
        })
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(OllamaError::Config(format!(
            "Base URL must start with http:// or https://: {}",
            raw
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_url() {
        let config = ClientConfig::resolve_from(None, None).unwrap();
        assert_eq!(config.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_default_timeouts() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.chat_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_env_overrides_config() {
        let config =
            ClientConfig::resolve_from(Some("http://gpu-box:11434/"), Some("http://other:1"))
                .unwrap();
        assert_eq!(config.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_blank_env_falls_back() {
        let config = ClientConfig::resolve_from(Some("  "), Some("http://other:1/")).unwrap();
        assert_eq!(config.base_url, "http://other:1");
    }

    #[test]
    fn test_rejects_missing_scheme() {
        let result = ClientConfig::resolve_from(None, Some("localhost:11434"));
        assert!(matches!(result, Err(OllamaError::Config(_))));
    }
}
