//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "\
Quick Start:
  $ deckwatch init                          # Create .deckwatch/settings.toml
  $ deckwatch watch                         # Log every channel firing
  $ deckwatch build q3-review               # Follow a build of every unbuilt slide
  $ deckwatch build q3-review --slide 4     # Follow a rebuild of slide 4
  $ deckwatch classify output/a/b/slides/slide-1.html";

/// Workspace watcher for generated slide decks
#[derive(Parser)]
#[command(
    name = "deckwatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch a deck workspace and track slide builds",
    long_about = "Watch the configuration and output trees of a deck workspace, \
                  route changes to debounced channels and infer build progress \
                  from slide files appearing on disk.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "DECKWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .deckwatch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    #[command(about = "Display active settings")]
    Config,

    /// Classify paths the way the watcher routes them
    #[command(about = "Show the channel each path would be routed to")]
    Classify {
        /// Paths to classify; they need not exist
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch the workspace and log channel firings
    #[command(about = "Watch config and output trees until Ctrl-C")]
    Watch,

    /// Track a build of a deck
    #[command(
        about = "Follow a deck build by watching its slide files",
        long_about = "Start tracking a build of DECK and print progress until every \
                      expected slide is on disk. Ctrl-C cancels the tracked build; \
                      the generator itself is not stopped."
    )]
    Build {
        /// Deck id (the directory containing `slides/`)
        deck: String,

        /// Build a single slide instead of every unbuilt one
        #[arg(short, long, value_name = "N")]
        slide: Option<u32>,

        /// Correlation id to attach to progress snapshots
        #[arg(long)]
        build_id: Option<String>,

        /// Print progress snapshots as JSON lines
        #[arg(long)]
        json: bool,
    },
}
