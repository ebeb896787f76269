//! CLI module for Ragline.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Ragline - YouTube transcripts into an Elasticsearch vector index
///
/// Loads video transcripts, splits them into chunks, embeds them and keeps them
/// in an Elasticsearch collection you can query by similarity.
#[derive(Parser, Debug)]
#[command(name = "ragline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "RAGLINE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a video transcript and print it as JSON
    Load {
        /// YouTube URL or video ID
        video: String,
    },

    /// Load, chunk and index a video transcript
    Ingest {
        /// YouTube URL or video ID
        video: String,

        /// Owning application id (overrides collection.app_id)
        #[arg(long)]
        app_id: Option<String>,
    },

    /// Find indexed chunks similar to a query
    Query {
        /// Query text
        text: String,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value = "5")]
        n_results: usize,

        /// Owning application id (overrides collection.app_id)
        #[arg(long)]
        app_id: Option<String>,

        /// Show ids, scores and sources with each result
        #[arg(long)]
        scores: bool,
    },

    /// Count documents in the collection
    Count,

    /// Delete the collection index and every document in it
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Check configuration, Elasticsearch and OpenAI access
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
