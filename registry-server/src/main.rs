#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

//! Main entry point for the `registry-server` CLI.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use server::{commands::spec::generate_spec, server::run};
use shared::config::server::Config;
use std::error::Error;
use std::path::PathBuf;


/// Main CLI structure for the registry server
#[derive(Parser, Debug)]
#[command(name = "registry-server")]
#[command(about = "In-memory user registry HTTP service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for the registry server CLI
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind, overriding configuration and environment
        #[arg(
            long,
            short,
            help = "The port number to bind the server to (e.g., 8000). Example usage: `--port 8000`"
        )]
        port: Option<u16>,

        /// Path to the configuration file (optional)
        #[arg(
            long,
            short,
            help = "Path to the configuration file (yaml, json or toml). If not provided, defaults will be used."
        )]
        config: Option<PathBuf>,
    },
    /// Print or write the OpenAPI document
    Spec {
        /// `yaml` or `json` to print to stdout, or a file path
        output: Option<String>,
    },
}

/// Handles the serve command by loading configuration and starting the server.
///
/// # Errors
/// Returns an error if configuration loading or server startup fails.
pub async fn handle_serve_command(
    port: Option<u16>,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let resolved_config = Config::load_config(config, port)?;
    run(resolved_config).await
}

/// Dispatches a parsed command line.
///
/// # Errors
/// Returns an error if the selected command fails.
pub async fn run_app(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Serve { port, config } => handle_serve_command(port, config).await,
        Commands::Spec { output } => generate_spec(output.as_deref()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    run_app(Cli::parse()).await
}
