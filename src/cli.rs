use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "periodical-distiller")]
#[command(author, version, about = "Turns harvested newspaper issues into sealed archival packages")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run harvested issues through every stage once
    Run {
        /// PIP directories (each holding a pip-manifest.json)
        #[arg(required = true)]
        pips: Vec<PathBuf>,
    },

    /// Continuously process one stage's input bucket
    Serve {
        /// Stage to run (html, pdf, alto, mods, image, mets)
        stage: String,
    },

    /// Show waiting, in-process and errored tokens per bucket
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Return errored tokens in a bucket to waiting
    Redrive {
        /// Bucket name
        bucket: String,

        /// Only re-drive this token
        #[arg(long)]
        id: Option<String>,
    },

    /// Check that configured stage commands are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
