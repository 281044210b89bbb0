use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "podsift",
    about = "Discover, transcribe, and de-advertise podcast episodes",
    version,
    long_about = "A CLI tool that searches podcast directories, downloads and transcribes episode audio, asks a language model to summarize the episode and flag advertising, and writes a redacted Markdown report."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search the podcast directory
    Search {
        /// Search term
        #[arg(value_name = "TERM")]
        term: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List the episodes of a podcast feed
    Episodes {
        /// RSS feed URL
        #[arg(value_name = "FEED_URL")]
        feed_url: String,
    },

    /// Download, transcribe, analyze, and render one episode
    Process {
        /// RSS feed URL
        #[arg(value_name = "FEED_URL")]
        feed_url: String,

        /// Episode index in the feed (0 is the newest)
        #[arg(short, long, default_value = "0")]
        episode: usize,

        /// Keep the downloaded audio file
        #[arg(long)]
        keep_audio: bool,

        /// Output directory for the rendered report
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Do not warn when the transcription language is not English
        #[arg(long)]
        no_language_check: bool,
    },

    /// Show current configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
