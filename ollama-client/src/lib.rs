//! Minimal client for a local Ollama runtime
//!
//! Covers what the chatbot bootstrapper needs to verify an installation:
//! - Locating the `ollama` binary on `PATH`
//! - Querying the daemon version
//! - Listing locally available models
//! - Streaming a chat reply from a model

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod runtime;

pub use chat::{ChatMessage, extract_text};
pub use client::{HttpRuntime, ModelInfo, RuntimeApi};
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use error::{OllamaError, Result};
pub use mock::MockRuntime;
pub use runtime::{RuntimePresence, find_runtime, find_runtime_in};
