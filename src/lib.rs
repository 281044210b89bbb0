//! podsift - A Rust CLI tool for discovering, transcribing, and
//! de-advertising podcast episodes
//!
//! This library discovers podcast episodes via directory search and RSS
//! feeds, downloads and transcribes episode audio, asks a language model to
//! summarize the episode and flag advertising spans, and renders a redacted
//! Markdown report. The pipeline isolates per-stage failures: a degraded
//! analysis still produces a full transcript, while download, transcription,
//! and rendering failures abort the run.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod download;
pub mod output;
pub mod pipeline;
pub mod redact;
pub mod retry;
pub mod transcribe;
pub mod utils;

pub use analysis::{AnalysisResult, AnalysisStage, ChatAnalyzer, LlmError, TranscriptAnalyzer};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use discovery::{DiscoveryClient, Episode, Podcast};
pub use download::{HttpDownloader, MediaDownloader};
pub use output::{MarkdownRenderer, Renderer};
pub use pipeline::{
    Pipeline, PipelineOptions, PipelineResult, Stage, StageError, StageOutcome, Warning,
};
pub use redact::{redact, Interval, IntervalSet, AD_MARKER};
pub use retry::{run_with_retry, ClassifyError, ErrorClass, RetryConfig, RetryError};
pub use transcribe::{Transcriber, Transcription, WhisperTranscriber};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
