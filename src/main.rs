//! mcdeploy CLI - Forge server provisioning over SSH

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use mcdeploy::config::DEFAULT_CONFIG_FILE;
use mcdeploy::error::{DeployError, FixSuggestion};
use mcdeploy::{
    AutoConfirm, Confirmer, DeployConfig, DryRunRemote, Remote, RunOutcome, Runner, SshRemote,
    TaskRegistry, TerminalConfirmer,
};

#[derive(Parser)]
#[command(name = "mcdeploy")]
#[command(about = "Provision and operate a Forge game server over SSH")]
#[command(version)]
struct Cli {
    /// Target name from the config file, or [user@]host[:port]
    #[arg(short = 'H', long, global = true, env = "MCDEPLOY_HOST")]
    host: Option<String>,

    /// Deployment config file (defaults to ./deploy.yaml if present)
    #[arg(short, long, global = true, env = "MCDEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    /// Print commands and uploads instead of executing them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print the run's event log as JSON when done
    #[arg(long, global = true)]
    events: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install Java, Forge, config, mods, system user and service from scratch
    Install,
    /// Upload configuration files
    UploadConfig,
    /// Upload configuration files and restart the server
    UpdateConfig,
    /// Upload the local mods directory
    UploadMods,
    /// Upload mods and restart the server
    UpdateMods,
    /// Stop the server and delete all of its files (asks first)
    Clean,
    /// Start the server
    Start,
    /// Stop the server
    Stop,
    /// Restart the server
    Restart,
    /// Follow the server log
    Journalctl,
    /// List the server console sessions
    Screen,
    /// List available tasks
    List,
}

impl Commands {
    /// Catalogue task name, `None` for local-only commands
    fn task_name(&self) -> Option<&'static str> {
        match self {
            Commands::Install => Some("install"),
            Commands::UploadConfig => Some("upload-config"),
            Commands::UpdateConfig => Some("update-config"),
            Commands::UploadMods => Some("upload-mods"),
            Commands::UpdateMods => Some("update-mods"),
            Commands::Clean => Some("clean"),
            Commands::Start => Some("start"),
            Commands::Stop => Some("stop"),
            Commands::Restart => Some("restart"),
            Commands::Journalctl => Some("journalctl"),
            Commands::Screen => Some("screen"),
            Commands::List => None,
        }
    }
}

fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // RUST_LOG wins; --verbose only picks the default level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command.task_name() {
        Some(task) => run_task(&cli, task),
        None => list_tasks(&cli),
    };

    match result {
        Ok(RunOutcome::Completed) => {}
        Ok(RunOutcome::Aborted) => {
            println!("{} Aborted, nothing after the prompt was run", "!".yellow());
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.fix_suggestion() {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<DeployConfig, DeployError> {
    match &cli.config {
        Some(path) if !path.exists() => Err(DeployError::Config {
            reason: format!("Config file not found: {}", path.display()),
        }),
        Some(path) => DeployConfig::load(path),
        None => DeployConfig::load(Path::new(DEFAULT_CONFIG_FILE)),
    }
}

fn build_runner(config: &DeployConfig) -> Result<Runner, DeployError> {
    let mods = config.mods_mapping()?;
    debug!(mods = mods.len(), "Listed mods");
    Ok(Runner::new(TaskRegistry::standard(config, &mods)?))
}

fn list_tasks(cli: &Cli) -> Result<RunOutcome, DeployError> {
    let config = load_config(cli)?;
    let runner = build_runner(&config)?;

    println!("{}", "Tasks:".cyan().bold());
    for task in runner.registry().iter() {
        println!(
            "  {:<15} {} {}",
            task.name().bold(),
            task.description(),
            format!("({} steps)", task.steps().len()).dimmed()
        );
    }
    if !config.targets.is_empty() {
        println!("{}", "Targets:".cyan().bold());
        for (name, target) in &config.targets {
            println!("  {:<15} {}", name.bold(), target);
        }
    }
    Ok(RunOutcome::Completed)
}

fn run_task(cli: &Cli, task: &str) -> Result<RunOutcome, DeployError> {
    let host = cli.host.as_deref().ok_or_else(|| DeployError::Config {
        reason: "No target given: pass --host <name> or set MCDEPLOY_HOST".to_string(),
    })?;
    let config = load_config(cli)?;
    let target = config.resolve_target(host)?;
    let runner = build_runner(&config)?;

    println!(
        "{} {} on {}{}",
        "→".cyan(),
        task.cyan().bold(),
        target.to_string().cyan(),
        if cli.dry_run { " (dry run)" } else { "" }
    );

    // Dropped at the end of this function, closing the connection on every path
    let mut remote: Box<dyn Remote> = if cli.dry_run {
        Box::new(DryRunRemote::new(target))
    } else {
        let ssh = SshRemote::connect(&target).map_err(|e| DeployError::Connection {
            target: target.to_string(),
            reason: format!("{e:#}"),
        })?;
        Box::new(ssh)
    };
    let mut confirmer: Box<dyn Confirmer> = if cli.yes {
        Box::new(AutoConfirm(true))
    } else {
        Box::new(TerminalConfirmer::stdio())
    };

    let result = runner.run(task, remote.as_mut(), confirmer.as_mut());

    if cli.events {
        match runner.event_log().to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{} could not serialize events: {}", "!".yellow(), e),
        }
    }

    if let Ok(RunOutcome::Completed) = result {
        println!("{} {} completed", "✓".green(), task);
    }
    result
}
