use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cadence::agent::{Agent, StaticPrompt};
use cadence::configuration::Settings;
use cadence::providers::factory;

mod prompt;
mod session;
mod tools;

use prompt::RustylinePrompt;
use session::Session;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML); defaults to ~/.config/cadence/config.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wait for whole answers instead of streaming them
    #[arg(long)]
    no_stream: bool,

    /// System prompt sent with every request
    #[arg(short, long)]
    system: Option<String>,

    /// Run a single task with this message and exit
    #[arg(short, long)]
    message: Option<String>,
}

fn default_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("cadence").join("config.toml");
    path.exists().then_some(path)
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("CADENCE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);
    let mut settings =
        Settings::load(config_path.as_deref()).context("Failed to load settings")?;
    if cli.no_stream {
        settings.agent.streaming = false;
    }
    tracing::info!(
        provider = %settings.provider.provider_type(),
        model = settings.provider.model(),
        "loaded settings"
    );

    let provider = factory::get_provider(settings.provider.into_config())?;
    let registry = tools::builtin_registry();
    let system = format!(
        "{}\n\n{}",
        cli.system.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT),
        registry.instructions()
    );

    let agent = Agent::new(provider, Arc::new(registry), StaticPrompt(system))
        .with_settings(settings.agent);
    let mut session = Session::new(agent, Box::new(RustylinePrompt::new()?));

    match cli.message {
        Some(message) => session.headless_start(message).await,
        None => session.start().await,
    }
}
