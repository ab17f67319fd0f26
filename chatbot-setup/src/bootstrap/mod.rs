//! Bootstrap sequence for the chatbot host.
//!
//! Brings a machine to the point where the chatbot can run:
//! - Refreshes the apt index and optionally upgrades the system
//! - Installs the Python requirements, offering a forced retry on failure
//! - Installs the Ollama runtime if it is not on `PATH`
//! - Checks that the Ollama daemon answers
//!
//! Every external effect goes through [`command::CommandRunner`],
//! [`prompt::Prompt`], [`download::Fetcher`] and [`runtime::RuntimeProbe`],
//! so the whole sequence can run against test doubles.

pub mod command;
pub mod download;
pub mod platform;
pub mod prompt;
pub mod report;
pub mod runtime;

use crate::config::{ErrorPolicy, SetupConfig};
use anyhow::{Context, Result};
use command::{apt_update, apt_upgrade, pip_install, CommandRunner, CommandSpec, BREAK_SYSTEM_PACKAGES};
use download::Fetcher;
use ollama_client::{ChatMessage, RuntimeApi};
use platform::Platform;
use prompt::Prompt;
use report::{SetupReport, Step, StepOutcome};
use runtime::{install_runtime, InstallerSource, RuntimeProbe};
use std::io::Write;

pub const UPGRADE_QUESTION: &str = "Do you want to perform a full system upgrade?";
pub const FORCE_QUESTION: &str =
    "Retry installing Python requirements with --break-system-packages?";
pub const COMPLETION_BANNER: &str = "---- Setup Completed ----";

/// External collaborators used by the sequence.
pub struct Host<'a> {
    pub platform: Platform,
    pub runner: &'a dyn CommandRunner,
    pub prompt: &'a mut dyn Prompt,
    pub fetcher: &'a dyn Fetcher,
    pub probe: &'a dyn RuntimeProbe,
    /// None disables the daemon health check.
    pub runtime: Option<&'a dyn RuntimeApi>,
}

/// Runs the bootstrap sequence, writing progress lines to `out`.
pub struct Bootstrapper<'a, W: Write> {
    config: &'a SetupConfig,
    host: Host<'a>,
    out: W,
}

impl<'a, W: Write> Bootstrapper<'a, W> {
    pub fn new(config: &'a SetupConfig, host: Host<'a>, out: W) -> Self {
        Self { config, host, out }
    }

    /// Consume the bootstrapper and return its output sink.
    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }

    /// Run every step in order.
    ///
    /// Step failures are recorded in the report, never returned as errors.
    /// `Err` is reserved for failures to talk to the operator (stdin/stdout).
    pub async fn run(&mut self) -> Result<SetupReport> {
        let mut report = SetupReport::default();

        let outcome = self.refresh_index()?;
        if !self.record(&mut report, Step::RefreshIndex, outcome) {
            return self.finish(report);
        }

        let outcome = self.system_upgrade()?;
        if !self.record(&mut report, Step::SystemUpgrade, outcome) {
            return self.finish(report);
        }

        let outcome = self.python_requirements()?;
        if !self.record(&mut report, Step::PythonRequirements, outcome) {
            return self.finish(report);
        }

        let outcome = self.runtime().await?;
        let runtime_ready = !outcome.is_failed();
        if !self.record(&mut report, Step::Runtime, outcome) {
            return self.finish(report);
        }

        let outcome = self.health_check(runtime_ready).await?;
        self.record(&mut report, Step::HealthCheck, outcome);

        self.finish(report)
    }

    /// Record an outcome. Returns false when the sequence must stop.
    fn record(&mut self, report: &mut SetupReport, step: Step, outcome: StepOutcome) -> bool {
        let stop = outcome.is_failed()
            && self.config.policy == ErrorPolicy::Strict
            && !step.is_advisory();

        match &outcome {
            StepOutcome::Failed(reason) => log::warn!("{} failed: {}", step, reason),
            other => log::debug!("{}: {:?}", step, other),
        }

        report.record(step, outcome);
        if stop {
            report.aborted_at = Some(step);
        }
        !stop
    }

    fn finish(&mut self, report: SetupReport) -> Result<SetupReport> {
        for (step, reason) in report.failures() {
            writeln!(self.out, "Warning: {} failed: {}", step, reason)?;
        }

        match report.aborted_at {
            Some(step) => writeln!(
                self.out,
                "---- Setup Aborted ({} failed, policy: strict) ----",
                step
            )?,
            None => writeln!(self.out, "{}", COMPLETION_BANNER)?,
        }

        self.out.flush()?;
        Ok(report)
    }

    /// Run a command, turning a non-zero exit or spawn error into a reason.
    fn exec(&self, cmd: &CommandSpec) -> std::result::Result<(), String> {
        match self.host.runner.run(cmd) {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(format!("`{}` failed with {}", cmd, status)),
            Err(e) => Err(format!("{:#}", e)),
        }
    }

    fn refresh_index(&mut self) -> Result<StepOutcome> {
        if !self.host.platform.has_apt() {
            return Ok(StepOutcome::Skipped(format!(
                "apt is not available on {}",
                self.host.platform.os.as_str()
            )));
        }

        writeln!(self.out, "Updating System Packages...")?;
        Ok(match self.exec(&apt_update(self.config.use_sudo)) {
            Ok(()) => StepOutcome::Done,
            Err(reason) => StepOutcome::Failed(reason),
        })
    }

    fn system_upgrade(&mut self) -> Result<StepOutcome> {
        if !self.host.platform.has_apt() {
            writeln!(self.out, "Skipping System Upgrade...")?;
            return Ok(StepOutcome::Skipped(format!(
                "apt is not available on {}",
                self.host.platform.os.as_str()
            )));
        }

        if !self.host.prompt.confirm(UPGRADE_QUESTION, &mut self.out)? {
            writeln!(self.out, "Skipping System Upgrade...")?;
            return Ok(StepOutcome::Skipped("declined by operator".to_string()));
        }

        writeln!(self.out, "Upgrading System Packages...")?;
        Ok(match self.exec(&apt_upgrade(self.config.use_sudo)) {
            Ok(()) => StepOutcome::Done,
            Err(reason) => StepOutcome::Failed(reason),
        })
    }

    fn python_requirements(&mut self) -> Result<StepOutcome> {
        let requirements = self.config.requirements.clone();
        let python = self.config.python.clone();

        if !requirements.is_file() {
            writeln!(self.out, "Python Requirements Installation Failed...")?;
            writeln!(
                self.out,
                "Requirements file not found: {}",
                requirements.display()
            )?;
            return Ok(StepOutcome::Failed(format!(
                "requirements file not found: {}",
                requirements.display()
            )));
        }

        writeln!(self.out, "Installing Python Requirements...")?;
        let first = pip_install(&python, &requirements, false);
        let first_error = match self.exec(&first) {
            Ok(()) => {
                writeln!(self.out, "Python Requirements Successfully Checked...")?;
                return Ok(StepOutcome::Done);
            }
            Err(reason) => reason,
        };

        writeln!(self.out, "Python Requirements Installation Failed...")?;
        if !self.host.prompt.confirm(FORCE_QUESTION, &mut self.out)? {
            writeln!(self.out, "Install them manually with: {}", first)?;
            writeln!(
                self.out,
                "or retry with {} if this is a dedicated machine.",
                BREAK_SYSTEM_PACKAGES
            )?;
            return Ok(StepOutcome::Failed(format!(
                "{} (forced retry declined)",
                first_error
            )));
        }

        let forced = pip_install(&python, &requirements, true);
        match self.exec(&forced) {
            Ok(()) => {
                writeln!(
                    self.out,
                    "Python Requirements Installed With {}...",
                    BREAK_SYSTEM_PACKAGES
                )?;
                Ok(StepOutcome::Done)
            }
            Err(reason) => {
                writeln!(
                    self.out,
                    "Python Requirements Installation Failed Again With {}...",
                    BREAK_SYSTEM_PACKAGES
                )?;
                Ok(StepOutcome::Failed(reason))
            }
        }
    }

    async fn runtime(&mut self) -> Result<StepOutcome> {
        if self.host.probe.probe().is_present() {
            writeln!(self.out, "Ollama Found... YES")?;
            return Ok(StepOutcome::AlreadySatisfied);
        }

        writeln!(self.out, "Ollama Found... NO")?;
        writeln!(self.out, "Installing Ollama...")?;

        let source = InstallerSource {
            url: &self.config.installer_url,
            sha256: self.config.installer_sha256.as_deref(),
            require_checksum: self.config.require_checksum,
        };

        if let Err(e) = install_runtime(&source, self.host.fetcher, self.host.runner).await {
            writeln!(self.out, "Ollama Installation Failed: {:#}", e)?;
            return Ok(StepOutcome::Failed(format!("{:#}", e)));
        }

        match self.host.probe.probe() {
            ollama_client::RuntimePresence::Present(path) => {
                writeln!(self.out, "Ollama Installed... {}", path.display())?;
                Ok(StepOutcome::Done)
            }
            ollama_client::RuntimePresence::Absent => {
                writeln!(self.out, "Ollama Installation Failed: binary not on PATH")?;
                Ok(StepOutcome::Failed(
                    "installer finished but ollama is still not on PATH".to_string(),
                ))
            }
        }
    }

    async fn health_check(&mut self, runtime_ready: bool) -> Result<StepOutcome> {
        let api = match self.host.runtime {
            Some(api) if self.config.health_check => api,
            _ => return Ok(StepOutcome::Skipped("health check disabled".to_string())),
        };
        if !runtime_ready {
            return Ok(StepOutcome::Skipped("runtime not installed".to_string()));
        }

        let version = match api.version().await {
            Ok(version) => version,
            Err(e) => {
                writeln!(
                    self.out,
                    "Ollama Server Not Responding at {}. Start it with: ollama serve",
                    api.base_url()
                )?;
                return Ok(StepOutcome::Failed(e.to_string()));
            }
        };
        writeln!(self.out, "Ollama Server Running... v{}", version)?;

        match api.list_models().await {
            Ok(models) => {
                writeln!(self.out, "Models Available: {}", models.len())?;
                if models.is_empty() {
                    writeln!(self.out, "Pull a model with: ollama pull llama3.2")?;
                }
                Ok(StepOutcome::Done)
            }
            Err(e) => Ok(StepOutcome::Failed(e.to_string())),
        }
    }
}

/// Describe the host without changing anything.
pub async fn get_info(
    config: &SetupConfig,
    platform: &Platform,
    probe: &dyn RuntimeProbe,
    runtime: &dyn RuntimeApi,
) -> Result<String> {
    let mut info = String::new();

    info.push_str(&format!("Platform: {}\n", platform));
    info.push_str(&format!("Error policy: {}\n", config.policy));
    info.push_str(&format!(
        "Requirements: {} ({})\n",
        config.requirements.display(),
        if config.requirements.is_file() { "found" } else { "missing" }
    ));
    info.push_str("\n");

    match probe.probe().path() {
        Ok(path) => info.push_str(&format!("Ollama binary: {}\n", path.display())),
        Err(e) => info.push_str(&format!("Ollama binary: {}\n", e)),
    }

    info.push_str(&format!("Ollama server: {}\n", runtime.base_url()));
    match runtime.version().await {
        Ok(version) => {
            info.push_str(&format!("Server version: {}\n", version));
            match runtime.list_models().await {
                Ok(models) => {
                    info.push_str(&format!("Models: {}\n", models.len()));
                    for model in models {
                        info.push_str(&format!("  - {}\n", model.name));
                    }
                }
                Err(e) => info.push_str(&format!("Models: unavailable ({})\n", e)),
            }
        }
        Err(e) => info.push_str(&format!("Server: not responding ({})\n", e)),
    }

    Ok(info)
}

/// Send one message to `model` and stream the reply to `out`.
///
/// Fails when the daemon is unreachable, the model is missing or the
/// reply is empty.
pub async fn chat_check<W: Write + Send>(
    runtime: &dyn RuntimeApi,
    model: &str,
    message: &str,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Chatting with {}...", model)?;
    out.flush()?;

    let mut write_error = None;
    let reply = {
        let mut on_chunk = |chunk: &str| {
            if write_error.is_none() {
                if let Err(e) = out.write_all(chunk.as_bytes()).and_then(|_| out.flush()) {
                    write_error = Some(e);
                }
            }
        };
        runtime
            .chat_stream(model, &[ChatMessage::user(message)], &mut on_chunk)
            .await
    };
    if let Some(e) = write_error {
        return Err(e.into());
    }
    let reply = reply.with_context(|| format!("Chat with {} failed", model))?;
    writeln!(out)?;

    if reply.trim().is_empty() {
        anyhow::bail!("{} returned an empty reply", model);
    }
    Ok(())
}
