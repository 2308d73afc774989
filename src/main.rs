use anyhow::Result;
use clap::Parser;

use deckwatch::cli::commands;
use deckwatch::cli::{Cli, Commands};
use deckwatch::config::Settings;
use deckwatch::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration.");
        Settings::default()
    });

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => commands::init::run_init(force),
        Commands::Config => commands::init::run_config(&settings),
        Commands::Classify { paths, json } => commands::classify::run(&paths, json),
        Commands::Watch => commands::watch::run(&settings).await,
        Commands::Build {
            deck,
            slide,
            build_id,
            json,
        } => commands::build::run(&settings, &deck, slide, build_id, json).await,
    }
}
