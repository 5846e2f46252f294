//! App Longevity Predictor CLI
//!
//! A command-line tool for requesting longevity predictions, listing
//! available models, and browsing saved prediction history.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{history, models, predict};

/// App Longevity Predictor CLI
#[derive(Parser)]
#[command(name = "longevity")]
#[command(author, version, about = "CLI for App Longevity Predictor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via LONGEVITY_API_URL env var)
    #[arg(long, env = "LONGEVITY_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// User identity for history scoping (can also be set via LONGEVITY_USER env var)
    #[arg(long, env = "LONGEVITY_USER", default_value = "anonymous")]
    pub user: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict how long an app will stay viable
    Predict {
        /// App name
        app_name: String,

        /// Feature as key=value (repeatable); JSON values keep their type
        #[arg(long = "feature", short = 'f')]
        features: Vec<String>,

        /// JSON file containing a feature object
        #[arg(long)]
        features_file: Option<String>,

        /// Model to use instead of the server default
        #[arg(long)]
        model: Option<String>,

        /// Request competitor comparison
        #[arg(long)]
        compare: bool,
    },

    /// List available models
    Models,

    /// Browse saved predictions
    #[command(subcommand)]
    History(HistoryCommands),
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List saved predictions, newest first
    List {
        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum number of records to return
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one saved prediction in full
    Show {
        /// Record ID
        id: u64,
    },

    /// Delete a saved prediction
    Delete {
        /// Record ID
        id: u64,
    },

    /// Show aggregate statistics
    Stats,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url, &cli.user)?;

    match cli.command {
        Commands::Predict {
            app_name,
            features,
            features_file,
            model,
            compare,
        } => {
            predict::run(
                &client,
                &app_name,
                features,
                features_file,
                model,
                compare,
                cli.format,
            )
            .await?;
        }
        Commands::Models => {
            models::run(&client, cli.format).await?;
        }
        Commands::History(history_cmd) => match history_cmd {
            HistoryCommands::List { offset, limit } => {
                history::list(&client, offset, limit, cli.format).await?;
            }
            HistoryCommands::Show { id } => {
                history::show(&client, id, cli.format).await?;
            }
            HistoryCommands::Delete { id } => {
                history::delete(&client, id, cli.format).await?;
            }
            HistoryCommands::Stats => {
                history::stats(&client, cli.format).await?;
            }
        },
    }

    Ok(())
}
