//! chatbot-setup - Prepare a host to run the Ollama chatbot

mod bootstrap;
mod config;

use anyhow::{Context, Result};
use bootstrap::command::SystemRunner;
use bootstrap::download::{normalize_sha256, HttpFetcher};
use bootstrap::platform::Platform;
use bootstrap::prompt::{FixedPrompt, Prompt, StdinPrompt};
use bootstrap::runtime::PathProbe;
use bootstrap::{Bootstrapper, Host};
use clap::{Parser, Subcommand};
use config::{ErrorPolicy, SetupConfig};
use ollama_client::{ClientConfig, HttpRuntime};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "chatbot-setup")]
#[command(about = "Install system packages, Python requirements and the Ollama runtime for the chatbot", long_about = None)]
#[command(version)]
struct Args {
    /// Python requirements file (default: requirements.txt)
    #[arg(short, long)]
    requirements: Option<PathBuf>,

    /// Stop at the first failed step instead of continuing
    #[arg(long)]
    strict: bool,

    /// Answer yes to every prompt
    #[arg(short, long, conflicts_with = "no")]
    yes: bool,

    /// Answer no to every prompt
    #[arg(short, long)]
    no: bool,

    /// Do not prefix apt commands with sudo
    #[arg(long)]
    no_sudo: bool,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show platform, runtime and daemon status without changing anything
    Status {
        /// Also send a message to this model and stream its reply
        #[arg(long, value_name = "MODEL")]
        chat: Option<String>,

        /// Message sent with --chat
        #[arg(long, default_value = "Reply with one short sentence to confirm you are working.")]
        message: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Set the default error policy
    SetPolicy {
        #[arg(value_enum)]
        policy: ErrorPolicy,
    },
    /// Set the default requirements file
    SetRequirements {
        /// Path to requirements.txt
        path: PathBuf,
    },
    /// Pin the expected sha256 of the Ollama installer script
    SetInstallerSha256 {
        /// 64 hex characters
        sha256: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    match &args.command {
        Some(Commands::Config { action }) => {
            handle_config_command(action)?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Status { chat, message }) => {
            let config = SetupConfig::load().context("Failed to load configuration")?;
            status(&config, chat.as_deref(), message).await?;
            return Ok(ExitCode::SUCCESS);
        }
        None => {}
    }

    let mut config = SetupConfig::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    log::debug!("Configuration: {:?}", config);

    let platform = Platform::detect()?;
    let client_config = ClientConfig::resolve(config.ollama_base_url.as_deref())?;
    let http_runtime = HttpRuntime::new(&client_config)?;

    let mut prompt: Box<dyn Prompt> = if args.yes {
        Box::new(FixedPrompt::new(true))
    } else if args.no {
        Box::new(FixedPrompt::new(false))
    } else {
        Box::new(StdinPrompt::stdin())
    };

    let fetcher = HttpFetcher::new();
    let host = Host {
        platform,
        runner: &SystemRunner,
        prompt: prompt.as_mut(),
        fetcher: &fetcher,
        probe: &PathProbe,
        runtime: Some(&http_runtime),
    };

    let stdout = std::io::stdout();
    let mut bootstrapper = Bootstrapper::new(&config, host, stdout.lock());
    let report = bootstrapper.run().await?;
    log::debug!(
        "Setup finished: {} step(s), clean: {}",
        report.steps.len(),
        report.is_clean()
    );

    if report.completed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Command-line flags take precedence over the config file.
fn apply_overrides(config: &mut SetupConfig, args: &Args) {
    if let Some(ref path) = args.requirements {
        config.requirements = path.clone();
    }
    if args.strict {
        config.policy = ErrorPolicy::Strict;
    }
    if args.no_sudo {
        config.use_sudo = false;
    }
}

async fn status(config: &SetupConfig, chat: Option<&str>, message: &str) -> Result<()> {
    let platform = Platform::detect()?;
    let client_config = ClientConfig::resolve(config.ollama_base_url.as_deref())?;
    let runtime = HttpRuntime::new(&client_config)?;
    print!(
        "{}",
        bootstrap::get_info(config, &platform, &PathProbe, &runtime).await?
    );

    if let Some(model) = chat {
        println!();
        bootstrap::chat_check(&runtime, model, message, &mut std::io::stdout()).await?;
    }
    Ok(())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = SetupConfig::load()?;
            println!("Configuration file: {}", SetupConfig::config_path()?.display());
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", SetupConfig::config_path()?.display());
        }
        ConfigAction::SetPolicy { policy } => {
            let mut config = SetupConfig::load()?;
            config.policy = *policy;
            config.save()?;
            println!("Error policy set to: {}", policy);
        }
        ConfigAction::SetRequirements { path } => {
            let mut config = SetupConfig::load()?;
            config.requirements = path.clone();
            config.save()?;
            println!("Requirements file set to: {}", path.display());
        }
        ConfigAction::SetInstallerSha256 { sha256 } => {
            let sha256 = normalize_sha256(sha256)?;
            let mut config = SetupConfig::load()?;
            config.installer_sha256 = Some(sha256.clone());
            config.save()?;
            println!("Installer sha256 pinned to: {}", sha256);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_runs_bootstrap() {
        let args = Args::try_parse_from(["chatbot-setup"]).unwrap();
        assert!(args.command.is_none());
        assert!(!args.strict);
    }

    #[test]
    fn test_yes_and_no_conflict() {
        assert!(Args::try_parse_from(["chatbot-setup", "--yes", "--no"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "chatbot-setup",
            "--strict",
            "--no-sudo",
            "-r",
            "app/requirements.txt",
        ])
        .unwrap();
        let mut config = SetupConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.policy, ErrorPolicy::Strict);
        assert!(!config.use_sudo);
        assert_eq!(config.requirements, PathBuf::from("app/requirements.txt"));
    }

    #[test]
    fn test_overrides_keep_config_values() {
        let args = Args::try_parse_from(["chatbot-setup"]).unwrap();
        let mut config = SetupConfig {
            policy: ErrorPolicy::Strict,
            ..SetupConfig::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.policy, ErrorPolicy::Strict);
        assert!(config.use_sudo);
    }

    #[test]
    fn test_parse_config_subcommands() {
        let args =
            Args::try_parse_from(["chatbot-setup", "config", "set-policy", "strict"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::Config {
                action: ConfigAction::SetPolicy {
                    policy: ErrorPolicy::Strict
                }
            })
        ));

        let args = Args::try_parse_from(["chatbot-setup", "status"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Status { chat: None, .. })));
    }

    #[test]
    fn test_parse_status_chat() {
        let args = Args::try_parse_from(["chatbot-setup", "status", "--chat", "llama3.2"]).unwrap();
        match args.command {
            Some(Commands::Status { chat, message }) => {
                assert_eq!(chat.as_deref(), Some("llama3.2"));
                assert!(!message.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = Args::try_parse_from([
            "chatbot-setup",
            "status",
            "--chat",
            "llava",
            "--message",
            "hi",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::Status { message, .. }) if message == "hi"
        ));
    }
}
