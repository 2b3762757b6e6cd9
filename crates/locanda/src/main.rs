// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Locanda - a multi-tenant hotel operations agent.
//!
//! Binary entry point. Each Telegram user maps to a dedicated Postgres
//! role with its own credentials; the agent runs every query under that
//! role, so row-level policies apply automatically.

mod config;
mod onboarding;
mod producers;
mod prompt;
mod serve;
mod tools;

use clap::{Parser, Subcommand};

/// Locanda - a multi-tenant hotel operations agent.
#[derive(Parser, Debug)]
#[command(name = "locanda", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the agent (default).
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = match config::load() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            };
            if let Err(e) = serve::run(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }
}
