//! kiln CLI - static front-end asset pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kiln_core::TaskId;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::Project;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Build, watch and serve a static front-end")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to kiln.toml config file
    #[arg(short, long, default_value = "kiln.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Assemble pages from components
    #[command(name = "buildHTML", alias = "build-html")]
    BuildHtml,

    /// Compile, prefix and minify the stylesheet
    #[command(name = "buildStyles", alias = "build-styles")]
    BuildStyles,

    /// Convert staged fonts to ttf, woff and woff2
    #[command(name = "buildFonts", alias = "build-fonts")]
    BuildFonts,

    /// Encode and optimise images
    #[command(name = "buildImages", alias = "build-images")]
    BuildImages,

    /// Minify the script bundle
    #[command(name = "buildScripts", alias = "build-scripts")]
    BuildScripts,

    /// Delete the distributable directory
    #[command(name = "cleanDist", alias = "clean-dist")]
    CleanDist,

    /// Copy built artifacts into the distributable directory
    #[command(name = "buildApp", alias = "build-app")]
    BuildApp {
        /// Copy whatever exists instead of failing on missing artifacts
        #[arg(long)]
        allow_incomplete: bool,
    },

    /// Rebuild on source changes
    Watching,

    /// Serve the source root with live reload
    #[command(name = "syncBrowser", alias = "sync-browser")]
    SyncBrowser {
        /// Port to listen on (defaults to config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Produce a release: clean then assemble
    Build {
        /// Run every asset builder before assembling
        #[arg(long)]
        full: bool,

        /// Copy whatever exists instead of failing on missing artifacts
        #[arg(long)]
        allow_incomplete: bool,
    },

    /// Build everything, then serve and watch
    Default,

    /// Scaffold a source tree and kiln.toml
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("KILN_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let load = || Project::load(&cli.config);

    match cli.command.unwrap_or(Commands::Default) {
        Commands::BuildHtml => commands::task::run(&load()?, TaskId::Html).await,
        Commands::BuildStyles => commands::task::run(&load()?, TaskId::Styles).await,
        Commands::BuildFonts => commands::task::run(&load()?, TaskId::Fonts).await,
        Commands::BuildImages => commands::task::run(&load()?, TaskId::Images).await,
        Commands::BuildScripts => commands::task::run(&load()?, TaskId::Scripts).await,
        Commands::CleanDist => commands::task::run(&load()?, TaskId::Clean).await,
        Commands::BuildApp { allow_incomplete } => {
            commands::build::assemble(&load()?, allow_incomplete).await
        }
        Commands::Build {
            full,
            allow_incomplete,
        } => commands::build::run(&load()?, full, allow_incomplete).await,
        Commands::Watching => commands::watch::run(&load()?).await,
        Commands::SyncBrowser { port, no_open } => {
            commands::serve::run(&load()?, port, !no_open).await
        }
        Commands::Default => commands::default::run(&load()?).await,
        Commands::Init { yes } => commands::init::run(&Project::base_dir(&cli.config), yes),
    }
}
