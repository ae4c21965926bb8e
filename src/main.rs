use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reefshift::catalog::FileCatalog;
use reefshift::chat::ChatOrchestrator;
use reefshift::config::Config;
use reefshift::db::Store;
use reefshift::llm::create_llm_provider;
use reefshift::server::{serve, AppState};
use reefshift::tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "reefshift", about = "Fish farm shift scheduling service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations and start the HTTP server (default).
    Serve,
    /// Run pending database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reefshift=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = Store::new(&config.database).await?;
    store.run_migrations().await?;

    if matches!(cli.command, Some(Command::Migrate)) {
        tracing::info!("Migrations applied");
        return Ok(());
    }

    let db: Arc<dyn reefshift::db::Database> = Arc::new(store);
    let catalog = Arc::new(FileCatalog::new(&config.catalog_path));
    let provider = create_llm_provider(&config.llm)?;
    let tools = Arc::new(ToolRegistry::standard(db.clone(), catalog.clone()));
    let chat = Arc::new(ChatOrchestrator::new(
        db.clone(),
        catalog.clone(),
        provider,
        tools,
        config.chat.clone(),
    ));

    let state = AppState { db, catalog, chat };
    serve(state, &config.server.host, config.server.port).await
}
