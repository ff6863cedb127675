use std::path::PathBuf;

use clap::Parser;
use docchat_lib::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "docchat")]
#[command(about = "Chat with documents and plot spreadsheets from the terminal")]
struct Cli {
    /// Config file (default: ~/.config/docchat/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model identifier sent with every request
    #[arg(long)]
    model: Option<String>,

    /// together, openai or ollama
    #[arg(long)]
    provider: Option<String>,

    /// Override the provider endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Files to open at startup; the last one becomes active
    files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.config.or_else(AppConfig::default_path);
    let (mut config, load_error) = match &path {
        Some(path) => AppConfig::load_or_default(path),
        None => (AppConfig::default(), None),
    };
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    if let Some(provider) = cli.provider {
        config.llm.provider = provider;
    }
    if let Some(base_url) = cli.base_url {
        config.llm.base_url = Some(base_url);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    match (&path, load_error) {
        (Some(path), Some(e)) => tracing::warn!(
            "Failed to load config from {}: {}. Using defaults.",
            path.display(),
            e
        ),
        (Some(path), None) if path.exists() => {
            tracing::info!("Configuration loaded from {}", path.display())
        }
        _ => {}
    }
    tracing::debug!(?config, "Configuration resolved");

    docchat_lib::run(config, cli.files)
}
