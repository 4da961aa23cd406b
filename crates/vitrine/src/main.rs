//! vitrine CLI - story discovery, bundling and live preview.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "vitrine")]
#[command(about = "Bundle component stories and preview them live")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to vitrine.toml config file
    #[arg(short, long, default_value = "vitrine.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize vitrine in the current project
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Compile stories and write the artifact set
    Bundle {
        /// Story file pattern
        #[arg(long)]
        story_path: Option<String>,

        /// Project build configuration file
        #[arg(long)]
        build_config: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Keep existing output instead of cleaning it first
        #[arg(long)]
        no_clean: bool,
    },

    /// Start the live preview server
    Preview {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(yes).await?;
        }
        Commands::Bundle {
            story_path,
            build_config,
            output,
            namespace,
            no_clean,
        } => {
            let file_config = config::load_config(&cli.config)?;
            let overrides = commands::bundle::Overrides {
                story_path,
                build_config,
                output,
                namespace,
                clean: !no_clean,
            };
            commands::bundle::run(file_config, overrides).await?;
        }
        Commands::Preview { port, no_open } => {
            let file_config = config::load_config(&cli.config)?;
            commands::preview::run(file_config, port, !no_open).await?;
        }
    }

    Ok(())
}
