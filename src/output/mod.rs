//! Markdown report rendering.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::AnalysisResult;
use crate::discovery::Episode;
use crate::utils::sanitize_filename;

/// Persists the finished report for one episode.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        episode: &Episode,
        analysis: &AnalysisResult,
        redacted_text: &str,
        language: &str,
    ) -> Result<PathBuf>;
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    podcast: &'a str,
    episode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    published: Option<DateTime<Utc>>,
    language: &'a str,
    topics: &'a [String],
    keywords: &'a [String],
    generated_at: DateTime<Utc>,
}

/// Writes `<output_dir>/<sanitized title>.md` with YAML front matter,
/// the summary, and the redacted transcript.
pub struct MarkdownRenderer {
    output_dir: PathBuf,
}

impl MarkdownRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn build_report(
        episode: &Episode,
        analysis: &AnalysisResult,
        redacted_text: &str,
        language: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<String> {
        let front_matter = FrontMatter {
            podcast: &episode.podcast,
            episode: &episode.title,
            published: episode.published,
            language,
            topics: &analysis.topics,
            keywords: &analysis.keywords,
            generated_at,
        };
        let yaml =
            serde_yaml::to_string(&front_matter).context("failed to serialize front matter")?;

        let mut report = String::with_capacity(redacted_text.len() + yaml.len() + 256);
        report.push_str("---\n");
        report.push_str(&yaml);
        report.push_str("---\n\n");
        report.push_str(&format!("# {}\n\n", episode.title));

        if !analysis.summary.is_empty() {
            report.push_str("## Summary\n\n");
            report.push_str(analysis.summary.trim());
            report.push_str("\n\n");
        }

        report.push_str("## Transcript\n\n");
        report.push_str(redacted_text);
        report.push('\n');
        Ok(report)
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    async fn render(
        &self,
        episode: &Episode,
        analysis: &AnalysisResult,
        redacted_text: &str,
        language: &str,
    ) -> Result<PathBuf> {
        fs_err::create_dir_all(&self.output_dir)?;
        let path = self
            .output_dir
            .join(format!("{}.md", sanitize_filename(&episode.title)));

        let report =
            Self::build_report(episode, analysis, redacted_text, language, Utc::now())?;
        fs_err::write(&path, report)?;

        tracing::info!(path = %path.display(), "report written");
        Ok(path)
    }
}
