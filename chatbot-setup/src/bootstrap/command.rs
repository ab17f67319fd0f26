//! External command construction and execution.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Flag that lets pip modify an externally managed (distro) Python.
pub const BREAK_SYSTEM_PACKAGES: &str = "--break-system-packages";

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Prefix with `sudo` when requested.
    pub fn elevated(self, use_sudo: bool) -> Self {
        if !use_sudo {
            return self;
        }
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// `apt update`
pub fn apt_update(use_sudo: bool) -> CommandSpec {
    CommandSpec::new("apt").arg("update").elevated(use_sudo)
}

/// `apt upgrade -y`
pub fn apt_upgrade(use_sudo: bool) -> CommandSpec {
    CommandSpec::new("apt")
        .args(["upgrade", "-y"])
        .elevated(use_sudo)
}

/// `<python> -m pip install -r <requirements> [--break-system-packages]`
pub fn pip_install(python: &str, requirements: &Path, force: bool) -> CommandSpec {
    let cmd = CommandSpec::new(python)
        .args(["-m", "pip", "install", "-r"])
        .arg(requirements.to_string_lossy());
    if force {
        cmd.arg(BREAK_SYSTEM_PACKAGES)
    } else {
        cmd
    }
}

/// `sh <script>`
pub fn run_installer(script: &Path) -> CommandSpec {
    CommandSpec::new("sh").arg(script.to_string_lossy())
}

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    /// None when terminated by a signal.
    pub code: Option<i32>,
}

impl CommandStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Executes external commands.
pub trait CommandRunner {
    /// Run to completion. `Err` means the command could not be started.
    fn run(&self, cmd: &CommandSpec) -> Result<CommandStatus>;
}

/// Runs commands on the host with inherited stdio.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandStatus> {
        log::debug!("Running: {}", cmd);

        let status = Command::new(&cmd.program)
            .args(&cmd.args)
            .status()
            .with_context(|| format!("Failed to run {}", cmd.program))?;

        log::debug!("{} finished with {:?}", cmd.program, status.code());
        Ok(CommandStatus {
            code: status.code(),
        })
    }
}

/// Records commands and answers with scripted exit codes.
///
/// Commands whose display string contains a registered pattern get that
/// pattern's next exit code; everything else succeeds.
#[cfg(test)]
pub struct RecordingRunner {
    calls: std::sync::Mutex<Vec<CommandSpec>>,
    rules: std::sync::Mutex<Vec<(String, std::collections::VecDeque<i32>)>>,
}

#[cfg(test)]
impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            rules: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Answer the next command containing `pattern` with `code`.
    pub fn exit_with(self, pattern: &str, code: i32) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|(p, _)| p == pattern) {
                Some((_, codes)) => codes.push_back(code),
                None => rules.push((pattern.to_string(), [code].into_iter().collect())),
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.calls().iter().any(|c| c.contains(fragment))
    }
}

#[cfg(test)]
impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandStatus> {
        let line = cmd.to_string();
        self.calls.lock().unwrap().push(cmd.clone());

        let mut rules = self.rules.lock().unwrap();
        let code = rules
            .iter_mut()
            .find(|(pattern, codes)| line.contains(pattern.as_str()) && !codes.is_empty())
            .and_then(|(_, codes)| codes.pop_front())
            .unwrap_or(0);

        Ok(CommandStatus { code: Some(code) })
    }
}
