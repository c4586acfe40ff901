//! CLI module for Anvil
//!
//! Provides:
//! - `serve`: HTTP API server (default)
//! - `run`: one request driven to completion on the console

use clap::{Parser, Subcommand};

pub mod run;

/// Anvil agent orchestrator CLI
#[derive(Parser, Debug)]
#[command(name = "anvil")]
#[command(about = "Plan, generate and review code with local and remote models")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve,
    /// Run a single request to completion
    Run {
        /// The request, in natural language
        request: String,
        /// Extra context as a JSON value
        #[arg(long)]
        context: Option<String>,
        /// Approve every gate without prompting
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => {
            let config = crate::server::load_config()?;
            crate::server::run(config).await
        }
        Some(Commands::Run {
            request,
            context,
            yes,
        }) => run::run(request, context, yes).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
