//! # House Spirit CLI (`house`)
//!
//! Ask the house a question, replay a resident's conversations, or inspect
//! the corpus and persona configuration.
//!
//! ## Usage
//!
//! ```bash
//! house --config ./config/house.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `house ask --name <n> "<question>"` | Answer a question in the house's voice and log it |
//! | `house history --name <n>` | Show a resident's conversations, newest first |
//! | `house patterns --name <n>` | Summarise rooms, topics and times of a resident's questions |
//! | `house index` | Load and index the document corpus, report per-file chunks |
//! | `house persona check` | Validate the persona config and template |
//! | `house persona render` | Print the rendered system prompt |
//!
//! Diagnostics go to stderr; stdout carries only command output.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use house_spirit::app::HouseApp;
use house_spirit::situation::Room;
use house_spirit::{ask, config, history, index_cmd, persona_cmd};

/// House Spirit: a retrieval-grounded persona for your home.
#[derive(Parser)]
#[command(name = "house", version, about = "Ask your house about itself")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/house.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/house.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the house a question.
    ///
    /// Fails immediately if no completion credentials are configured.
    /// The exchange is appended to the daily logs.
    Ask {
        /// Resident asking the question.
        #[arg(long)]
        name: String,

        /// Room the resident is in (e.g. kitchen, living-room, "Whole House").
        #[arg(long, default_value = "Whole House")]
        room: Room,

        /// Wait for the whole answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,

        /// The question.
        question: String,
    },

    /// Show a resident's logged conversations, newest first.
    History {
        #[arg(long)]
        name: String,
    },

    /// Summarise a resident's favourite rooms, topics and times.
    Patterns {
        #[arg(long)]
        name: String,
    },

    /// Load the document corpus and build the index.
    Index,

    /// Inspect the persona configuration.
    Persona {
        #[command(subcommand)]
        action: PersonaAction,
    },
}

#[derive(Subcommand)]
enum PersonaAction {
    /// Validate the persona config and template, listing every problem.
    Check,
    /// Print the system prompt for a room at the current time.
    Render {
        #[arg(long, default_value = "Whole House")]
        room: Room,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let filter =
        EnvFilter::try_new(&cfg.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "no config file, using defaults");
    }

    // Persona commands need no corpus or log, so only the others build the app.
    match cli.command {
        Commands::Persona { action } => match action {
            PersonaAction::Check => persona_cmd::run_persona_check(&cfg)?,
            PersonaAction::Render { room } => persona_cmd::run_persona_render(&cfg, room)?,
        },
        Commands::Ask {
            name,
            room,
            no_stream,
            question,
        } => {
            let app = HouseApp::new(cfg);
            ask::run_ask(&app, &name, room, &question, no_stream).await?;
        }
        Commands::History { name } => {
            history::run_history(&HouseApp::new(cfg), &name)?;
        }
        Commands::Patterns { name } => {
            history::run_patterns(&HouseApp::new(cfg), &name)?;
        }
        Commands::Index => {
            index_cmd::run_index(&HouseApp::new(cfg)).await?;
        }
    }

    Ok(())
}
