use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod analysis;
mod cli;
mod config;
mod discovery;
mod download;
mod output;
mod pipeline;
mod redact;
mod retry;
mod transcribe;
mod utils;

use analysis::{AnalysisStage, ChatAnalyzer, TranscriptAnalyzer};
use cli::{Cli, Commands};
use config::Config;
use discovery::DiscoveryClient;
use download::HttpDownloader;
use output::MarkdownRenderer;
use pipeline::{Pipeline, PipelineOptions};
use transcribe::WhisperTranscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_directive = if cli.verbose {
        "podsift=debug"
    } else {
        "podsift=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Search { term, limit } => search(&term, limit).await,
        Commands::Episodes { feed_url } => list_episodes(&feed_url).await,
        Commands::Process {
            feed_url,
            episode,
            keep_audio,
            output,
            no_language_check,
        } => {
            process(
                &feed_url,
                episode,
                keep_audio,
                output,
                no_language_check,
                cli.quiet,
            )
            .await
        }
        Commands::Config { show } => {
            let config = Config::load().await?;
            if show {
                config.display();
            } else {
                println!("Edit the config file at: {}", Config::config_path()?.display());
            }
            Ok(())
        }
    }
}

async fn search(term: &str, limit: usize) -> Result<()> {
    let client = DiscoveryClient::new()?;
    let podcasts = client.search(term, limit).await?;

    if podcasts.is_empty() {
        println!("No podcasts found for {term:?}");
        return Ok(());
    }

    for podcast in podcasts {
        println!("{}", style(&podcast.name).bold());
        if let Some(author) = &podcast.author {
            println!("  by {author}");
        }
        if let Some(count) = podcast.episode_count {
            println!("  {count} episodes");
        }
        println!("  {}", style(&podcast.feed_url).dim());
    }
    Ok(())
}

async fn list_episodes(feed_url: &str) -> Result<()> {
    let mut client = DiscoveryClient::new()?;
    let episodes = client.episodes(feed_url).await?;

    if episodes.is_empty() {
        println!("Feed has no playable episodes");
        return Ok(());
    }

    println!("{}", style(&episodes[0].podcast).bold());
    for (index, episode) in episodes.iter().enumerate() {
        let date = episode
            .published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let duration = episode
            .duration_secs
            .map(utils::format_duration)
            .unwrap_or_default();
        println!(
            "  [{index:3}] {date}  {}  {}",
            episode.title,
            style(duration).dim()
        );
    }
    Ok(())
}

async fn process(
    feed_url: &str,
    index: usize,
    keep_audio_flag: bool,
    output_override: Option<PathBuf>,
    no_language_check: bool,
    quiet: bool,
) -> Result<()> {
    let config = Config::load().await?;
    let keep_audio = keep_audio_flag || config.app.keep_audio;
    let check_language = config.app.check_language && !no_language_check;
    let output_dir = output_override.unwrap_or_else(|| config.app.output_dir.clone());

    let mut discovery = DiscoveryClient::new()?;
    let episodes = discovery.episodes(feed_url).await?;
    let episode = episodes.get(index).with_context(|| {
        format!(
            "feed has {} episodes, index {} is out of range",
            episodes.len(),
            index
        )
    })?;

    // Retained audio must outlive the temp dir, so it downloads elsewhere
    let temp_dir = tempfile::TempDir::new().context("Failed to create temporary directory")?;
    let download_dir = if keep_audio {
        std::env::current_dir()?
    } else {
        temp_dir.path().to_path_buf()
    };

    let api_key = config.api_key();
    let analyzer: Option<Arc<dyn TranscriptAnalyzer>> = api_key.as_deref().map(|key| {
        Arc::new(ChatAnalyzer::new(
            config.analysis.endpoint.as_str(),
            config.analysis.model.as_str(),
            key,
        )) as Arc<dyn TranscriptAnalyzer>
    });

    let pipeline = Pipeline::new(
        Arc::new(HttpDownloader::new(&download_dir, !quiet)),
        Arc::new(WhisperTranscriber::new(
            config.transcription.endpoint.as_str(),
            config.transcription.model.as_str(),
            api_key.unwrap_or_default(),
        )),
        AnalysisStage::new(analyzer, config.retry_config()),
        Arc::new(MarkdownRenderer::new(&output_dir)),
        PipelineOptions {
            keep_audio,
            check_language,
        },
    );

    let result = pipeline.run(episode).await?;

    println!(
        "{} {}",
        style("Report written:").green().bold(),
        result.output_path.display()
    );
    if !result.warnings.is_empty() {
        println!(
            "{}",
            style(format!("{} warning(s):", result.warnings.len()))
                .yellow()
                .bold()
        );
        for warning in &result.warnings {
            println!("  [{}] {}", warning.stage, warning.message);
        }
    }
    Ok(())
}
