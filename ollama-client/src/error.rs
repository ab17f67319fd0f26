use thiserror::Error;

#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("Ollama runtime not found on PATH")]
    NotInstalled,

    #[error("Ollama daemon unreachable at {base_url}: {message}")]
    Unreachable { base_url: String, message: String },

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Chat stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OllamaError {
    /// True when the daemon could not be contacted at all, as opposed to
    /// answering with an error.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

pub type Result<T> = std::result::Result<T, OllamaError>;
