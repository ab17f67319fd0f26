//! Locating the Ollama binary

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::{OllamaError, Result};

/// Name of the runtime executable
pub const RUNTIME_BINARY: &str = "ollama";

/// Whether the runtime binary is on the search path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimePresence {
    Present(PathBuf),
    Absent,
}

impl RuntimePresence {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Path to the binary, or [`OllamaError::NotInstalled`]
    pub fn path(&self) -> Result<&Path> {
        match self {
            Self::Present(path) => Ok(path),
            Self::Absent => Err(OllamaError::NotInstalled),
        }
    }
}

/// Look up `ollama` on the process `PATH`
pub fn find_runtime() -> RuntimePresence {
    match which::which(RUNTIME_BINARY) {
        Ok(path) => RuntimePresence::Present(path),
        Err(_) => RuntimePresence::Absent,
    }
}

/// Look up `ollama` on an explicit search path
pub fn find_runtime_in<P: AsRef<OsStr>>(paths: P) -> RuntimePresence {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    match which::which_in(RUNTIME_BINARY, Some(paths), cwd) {
        Ok(path) => RuntimePresence::Present(path),
        Err(_) => RuntimePresence::Absent,
    }
}
