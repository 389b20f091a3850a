mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kiln-cli")]
#[command(about = "Kiln CLI - Submit code for execution and poll for verdicts", long_about = None)]
struct Cli {
    /// Base URL of the dispatch API
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    api: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a source file and wait for the verdict
    Submit {
        /// Language tag (python, javascript, cpp, csharp)
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,

        /// Problem ID to grade against (omit for a free run)
        #[arg(short, long)]
        problem: Option<i32>,

        /// Give up polling after this many seconds
        #[arg(long, default_value = "120")]
        timeout: u64,
    },

    /// Check that the dispatch API is up
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            language,
            file,
            problem,
            timeout,
        } => commands::submit(&cli.api, &language, &file, problem, timeout).await?,
        Commands::Health => commands::health(&cli.api).await?,
    }

    Ok(())
}
