//! Splice CLI: create, inspect, compile, and export timeline projects.
//!
//! Usage:
//!   splice init <NAME>        Create an empty project
//!   splice info <PATH>        Show project information
//!   splice validate <PATH>    Check source media and references
//!   splice compile <PATH>     Print the composition graph as JSON
//!   splice export <PATH>      Render a project to a video file
//!   splice check              Check for an encoder

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use splice_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "splice",
    about = "Multi-track timeline editing and export",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new empty project
    Init {
        /// Project name
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Canvas width (defaults to the configured canvas)
        #[arg(long)]
        width: Option<u32>,

        /// Canvas height (defaults to the configured canvas)
        #[arg(long)]
        height: Option<u32>,
    },

    /// Show project information
    Info {
        /// Path to project directory
        path: PathBuf,
    },

    /// Validate a project directory
    Validate {
        /// Path to project directory
        path: PathBuf,
    },

    /// Compile the timeline and print the composition graph
    Compile {
        /// Path to project directory
        path: PathBuf,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Export a project to video
    Export {
        /// Path to project directory
        path: PathBuf,

        /// Output file path (defaults to exports/<name>.<container>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that the configured encoder is available
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    splice_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Init {
            name,
            output,
            width,
            height,
        } => commands::init::run(&config, name, output, width, height),
        Commands::Info { path } => commands::info::run(path),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Compile { path, pretty } => commands::compile::run(path, pretty),
        Commands::Export { path, output } => commands::export::run(&config, path, output).await,
        Commands::Check => commands::check::run(&config).await,
    }
}
