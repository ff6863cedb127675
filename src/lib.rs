pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod doc_processor;
pub mod error;
pub mod llm;
pub mod plot;
pub mod repl;
pub mod router;
pub mod table;

use std::path::PathBuf;

pub use commands::{ChatSession, OpenedDocument, Reply};
pub use config::{AppConfig, ConfigError};
pub use error::ChatError;
pub use llm::{ChatModel, LlmError, Provider};

use repl::Repl;

/// Start a session against the configured provider, open `files`, then hand
/// the terminal to the REPL until the user quits.
pub fn run(config: AppConfig, files: Vec<PathBuf>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let provider = Provider::from_config(&config.llm)?;
    tracing::info!(
        provider = provider.name(),
        model = %config.llm.model,
        "Starting session"
    );

    let session = ChatSession::new(provider, &config)?;
    let mut repl = Repl::new(session, runtime);
    for file in &files {
        repl.open(file);
    }
    repl.run()
}
