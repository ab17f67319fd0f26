//! Ollama runtime detection and installation.
//!
//! The installer script is downloaded into a scoped temporary directory,
//! hashed, checked against the configured digest and only then executed.
//! The directory is removed when the function returns, on every path.

use super::command::{run_installer, CommandRunner};
use super::download::{sha256_file, verify_checksum, Fetcher};
use anyhow::{Context, Result};
use ollama_client::{find_runtime, RuntimePresence};
use std::path::Path;

/// Reports whether the runtime binary is installed.
pub trait RuntimeProbe {
    fn probe(&self) -> RuntimePresence;
}

/// Looks for `ollama` on `PATH`.
pub struct PathProbe;

impl RuntimeProbe for PathProbe {
    fn probe(&self) -> RuntimePresence {
        find_runtime()
    }
}

/// Where to get the installer and how to check it.
pub struct InstallerSource<'a> {
    pub url: &'a str,
    pub sha256: Option<&'a str>,
    pub require_checksum: bool,
}

/// Download, verify and run the installer using the system temp directory.
pub async fn install_runtime(
    source: &InstallerSource<'_>,
    fetcher: &dyn Fetcher,
    runner: &dyn CommandRunner,
) -> Result<()> {
    install_runtime_in(&std::env::temp_dir(), source, fetcher, runner).await
}

/// Download, verify and run the installer inside `parent`.
pub async fn install_runtime_in(
    parent: &Path,
    source: &InstallerSource<'_>,
    fetcher: &dyn Fetcher,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let temp_dir = tempfile::Builder::new()
        .prefix("ollama-install-")
        .tempdir_in(parent)
        .context("Failed to create temporary directory for installer")?;
    let script = temp_dir.path().join("install.sh");

    fetcher
        .fetch(source.url, &script)
        .await
        .with_context(|| format!("Failed to download {}", source.url))?;

    let digest = sha256_file(&script)?;
    log::info!("Installer sha256: {}", digest);

    verify_checksum(&digest, source.sha256, source.require_checksum)?;
    if source.sha256.is_none() {
        log::warn!(
            "No installer checksum configured; running unverified script (sha256 {})",
            digest
        );
    }

    let cmd = run_installer(&script);
    let status = runner.run(&cmd)?;
    if !status.success() {
        anyhow::bail!("Installer {} failed with {}", cmd, status);
    }

    Ok(())
}

/// Answers from a list; the last answer repeats.
#[cfg(test)]
pub struct ScriptedProbe {
    answers: std::sync::Mutex<std::collections::VecDeque<RuntimePresence>>,
}

#[cfg(test)]
impl ScriptedProbe {
    pub fn new(answers: Vec<RuntimePresence>) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.into()),
        }
    }

    pub fn present() -> Self {
        Self::new(vec![RuntimePresence::Present("/usr/local/bin/ollama".into())])
    }

    pub fn absent() -> Self {
        Self::new(vec![RuntimePresence::Absent])
    }
}

#[cfg(test)]
impl RuntimeProbe for ScriptedProbe {
    fn probe(&self) -> RuntimePresence {
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            answers.front().cloned().unwrap_or(RuntimePresence::Absent)
        }
    }
}
