//! chatbot-setup configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_INSTALLER_URL: &str = "https://ollama.com/install.sh";

/// How failed steps are treated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Log the failure and keep going
    #[default]
    BestEffort,
    /// Stop at the first failed step
    Strict,
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorPolicy::BestEffort => f.write_str("best-effort"),
            ErrorPolicy::Strict => f.write_str("strict"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Failure handling for the bootstrap sequence
    #[serde(default)]
    pub policy: ErrorPolicy,

    /// Python dependency manifest
    #[serde(default = "default_requirements")]
    pub requirements: PathBuf,

    /// Python interpreter used to run pip
    #[serde(default = "default_python")]
    pub python: String,

    /// Prefix package manager commands with sudo
    #[serde(default = "default_true")]
    pub use_sudo: bool,

    /// Ollama installer script URL (must be HTTPS)
    #[serde(default = "default_installer_url")]
    pub installer_url: String,

    /// Expected sha256 of the installer script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_sha256: Option<String>,

    /// Refuse to run an installer without a configured checksum
    #[serde(default)]
    pub require_checksum: bool,

    /// Ollama daemon address (OLLAMA_BASE_URL takes precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_base_url: Option<String>,

    /// Query the daemon after installation
    #[serde(default = "default_true")]
    pub health_check: bool,
}

fn default_requirements() -> PathBuf {
    PathBuf::from("requirements.txt")
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_installer_url() -> String {
    DEFAULT_INSTALLER_URL.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            policy: ErrorPolicy::default(),
            requirements: default_requirements(),
            python: default_python(),
            use_sudo: true,
            installer_url: default_installer_url(),
            installer_sha256: None,
            require_checksum: false,
            ollama_base_url: None,
            health_check: true,
        }
    }
}

impl SetupConfig {
    /// Get the config file path: ~/.config/cli-programs/chatbot-setup.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Neither HOME nor USERPROFILE is set")?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("chatbot-setup.toml"))
    }

    /// Load config from the default location, returning defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load config from a specific file, returning defaults if absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: SetupConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SetupConfig::default();
        assert_eq!(config.policy, ErrorPolicy::BestEffort);
        assert_eq!(config.requirements, PathBuf::from("requirements.txt"));
        assert_eq!(config.python, "python3");
        assert!(config.use_sudo);
        assert_eq!(config.installer_url, "https://ollama.com/install.sh");
        assert!(config.installer_sha256.is_none());
        assert!(!config.require_checksum);
        assert!(config.health_check);
    }

    #[test]
    fn test_config_path() {
        let path = SetupConfig::config_path().unwrap();
        assert!(path.ends_with("cli-programs/chatbot-setup.toml"));
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
policy = "strict"
requirements = "app/requirements.txt"
python = "python3.12"
use_sudo = false
installer_sha256 = "abc"
require_checksum = true
ollama_base_url = "http://gpu-box:11434"
health_check = false
"#;
        let config: SetupConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.policy, ErrorPolicy::Strict);
        assert_eq!(config.requirements, PathBuf::from("app/requirements.txt"));
        assert_eq!(config.python, "python3.12");
        assert!(!config.use_sudo);
        assert_eq!(config.installer_sha256.as_deref(), Some("abc"));
        assert!(config.require_checksum);
        assert_eq!(config.ollama_base_url.as_deref(), Some("http://gpu-box:11434"));
        assert!(!config.health_check);
        assert_eq!(config.installer_url, "https://ollama.com/install.sh");
    }

    #[test]
    fn test_parse_empty_config() {
        let config: SetupConfig = toml::from_str("").unwrap();
        assert_eq!(config.policy, ErrorPolicy::BestEffort);
        assert!(config.use_sudo);
        assert!(config.health_check);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result: Result<SetupConfig, _> = toml::from_str(r#"policy = "yolo""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = SetupConfig::load_from(&temp_dir.path().join("none.toml")).unwrap();
        assert_eq!(config.python, "python3");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("chatbot-setup.toml");

        let mut config = SetupConfig::default();
        config.policy = ErrorPolicy::Strict;
        config.requirements = PathBuf::from("/srv/chatbot/requirements.txt");
        config.save_to(&path).unwrap();

        let loaded = SetupConfig::load_from(&path).unwrap();
        assert_eq!(loaded.policy, ErrorPolicy::Strict);
        assert_eq!(loaded.requirements, config.requirements);
        assert!(loaded.installer_sha256.is_none());
    }
}
