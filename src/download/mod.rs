//! Streaming download of episode audio.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};

use crate::utils::sanitize_filename;

/// Fetches a remote media file to local storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Download `url` and return the local path. On failure any partially
    /// written file has already been removed.
    async fn download(&self, url: &str) -> Result<PathBuf>;
}

/// Streaming HTTP downloader writing into a target directory.
pub struct HttpDownloader {
    client: reqwest::Client,
    target_dir: PathBuf,
    show_progress: bool,
}

impl HttpDownloader {
    pub fn new(target_dir: impl Into<PathBuf>, show_progress: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            target_dir: target_dir.into(),
            show_progress,
        }
    }

    /// Unique local filename: short random prefix plus the sanitized last
    /// path segment of the URL.
    fn filename_for(url: &str) -> String {
        let segment = url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "episode.mp3".to_string());

        format!(
            "{}_{}",
            &uuid::Uuid::new_v4().to_string()[..8],
            sanitize_filename(&segment)
        )
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("download request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("failed to download audio: HTTP {status}");
        }

        let total = response.content_length().unwrap_or(0);
        let progress = if self.show_progress {
            ProgressBar::new(total)
        } else {
            ProgressBar::hidden()
        };
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap(),
        );
        progress.set_message("Downloading audio...");

        let mut file = fs_err::File::create(path)?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("download stream interrupted")?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }

        progress.finish_with_message("Download complete");
        Ok(())
    }
}

#[async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<PathBuf> {
        fs_err::create_dir_all(&self.target_dir)?;
        let path = self.target_dir.join(Self::filename_for(url));
        tracing::info!(%url, path = %path.display(), "downloading audio");

        match self.fetch_to(url, &path).await {
            Ok(()) => Ok(path),
            Err(e) => {
                if path.exists() {
                    if let Err(rm) = fs_err::remove_file(&path) {
                        tracing::warn!(error = %rm, "failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }
}
