//! Stage sequencing for one episode run.
//!
//! Stages execute strictly in order: download, transcribe, analysis, redact,
//! render, cleanup. Download, transcribe, and render failures abort the run;
//! analysis decides its own fate per sub-extraction; redaction is pure and
//! cannot fail. Cleanup runs exactly once after the download produced a file,
//! no matter which later stage failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisResult, AnalysisStage, LlmError};
use crate::discovery::Episode;
use crate::download::MediaDownloader;
use crate::output::Renderer;
use crate::redact::{redact, IntervalSet, AD_MARKER};
use crate::transcribe::Transcriber;

/// One discrete step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Transcribe,
    Analysis,
    Redact,
    Render,
    Cleanup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Analysis => "analysis",
            Stage::Redact => "redact",
            Stage::Render => "render",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// A stage completed with less than full output.
///
/// Warnings are accumulated in arrival order and never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub stage: Stage,
    pub message: String,
}

impl Warning {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// A failure that aborts the whole run, tagged with the stage it came from.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("download failed: {0}")]
    Download(anyhow::Error),

    #[error("transcription failed: {0}")]
    Transcribe(anyhow::Error),

    #[error("analysis failed: {0}")]
    Analysis(#[source] LlmError),

    #[error("rendering failed: {0}")]
    Render(anyhow::Error),
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Download(_) => Stage::Download,
            StageError::Transcribe(_) => Stage::Transcribe,
            StageError::Analysis(_) => Stage::Analysis,
            StageError::Render(_) => Stage::Render,
        }
    }
}

/// How a stage finished.
///
/// Downstream stages execute only on `Success` and `Degraded`; `Fatal`
/// terminates the pipeline immediately.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Success(T),
    Degraded(T, Vec<Warning>),
    Fatal(StageError),
}

/// Everything a completed run produced. Built once, never mutated.
#[derive(Debug)]
pub struct PipelineResult {
    pub output_path: PathBuf,
    pub transcription_language: String,
    pub analysis: AnalysisResult,
    pub warnings: Vec<Warning>,
}

/// Behavior toggles for one run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Retain the downloaded media file instead of deleting it in cleanup.
    pub keep_audio: bool,
    /// Warn when the transcription language is not English.
    pub check_language: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            keep_audio: false,
            check_language: true,
        }
    }
}

/// Sequences the stages for one episode and owns the media file's lifetime.
pub struct Pipeline {
    downloader: Arc<dyn MediaDownloader>,
    transcriber: Arc<dyn Transcriber>,
    analysis: AnalysisStage,
    renderer: Arc<dyn Renderer>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        downloader: Arc<dyn MediaDownloader>,
        transcriber: Arc<dyn Transcriber>,
        analysis: AnalysisStage,
        renderer: Arc<dyn Renderer>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            downloader,
            transcriber,
            analysis,
            renderer,
            options,
        }
    }

    /// Run the full pipeline for one episode.
    ///
    /// The downloader removes its own partial file on failure, so a download
    /// error returns without cleanup. Every failure after that point still
    /// passes through cleanup before this function returns.
    pub async fn run(&self, episode: &Episode) -> Result<PipelineResult, StageError> {
        tracing::info!(episode = %episode.title, "starting pipeline");

        let media_path = self
            .downloader
            .download(&episode.audio_url)
            .await
            .map_err(StageError::Download)?;

        let result = self.run_from_media(episode, &media_path).await;
        self.cleanup(&media_path);
        result
    }

    async fn run_from_media(
        &self,
        episode: &Episode,
        media_path: &Path,
    ) -> Result<PipelineResult, StageError> {
        tracing::info!(path = %media_path.display(), "transcribing");
        let transcription = self
            .transcriber
            .transcribe(media_path)
            .await
            .map_err(StageError::Transcribe)?;

        let mut warnings = Vec::new();
        if self.options.check_language && !is_english(&transcription.language) {
            tracing::warn!(language = %transcription.language, "non-English transcription");
            warnings.push(Warning::new(
                Stage::Transcribe,
                format!(
                    "transcription language is {:?}; analysis assumes English",
                    transcription.language
                ),
            ));
        }

        let analysis = match self.analysis.run(&transcription.text).await {
            StageOutcome::Success(analysis) => analysis,
            StageOutcome::Degraded(analysis, stage_warnings) => {
                warnings.extend(stage_warnings);
                analysis
            }
            StageOutcome::Fatal(e) => return Err(e),
        };

        let spans = IntervalSet::normalize(&analysis.ad_intervals, transcription.text.chars().count());
        tracing::info!(spans = spans.len(), "redacting ad segments");
        let redacted = redact(&transcription.text, &spans, AD_MARKER);

        let output_path = self
            .renderer
            .render(episode, &analysis, &redacted, &transcription.language)
            .await
            .map_err(StageError::Render)?;

        tracing::info!(
            output = %output_path.display(),
            warnings = warnings.len(),
            "pipeline finished"
        );

        Ok(PipelineResult {
            output_path,
            transcription_language: transcription.language,
            analysis,
            warnings,
        })
    }

    /// Delete or retain the downloaded media file, exactly once per run.
    ///
    /// Failures here are logged and swallowed; a finished run is not failed
    /// retroactively over a leftover temp file.
    fn cleanup(&self, media_path: &Path) {
        if self.options.keep_audio {
            tracing::info!(path = %media_path.display(), "keeping downloaded audio");
            return;
        }
        match fs_err::remove_file(media_path) {
            Ok(()) => tracing::debug!(path = %media_path.display(), "removed downloaded audio"),
            Err(e) => tracing::warn!(error = %e, "failed to remove downloaded audio"),
        }
    }
}

fn is_english(language: &str) -> bool {
    let lang = language.trim().to_ascii_lowercase();
    lang == "en" || lang == "english" || lang.starts_with("en-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::client::MockTranscriptAnalyzer;
    use crate::download::MockMediaDownloader;
    use crate::output::MockRenderer;
    use crate::redact::Interval;
    use crate::retry::RetryConfig;
    use crate::transcribe::{MockTranscriber, Transcription};
    use std::time::Duration;

    fn episode() -> Episode {
        Episode {
            guid: "ep-1".into(),
            podcast: "Testcast".into(),
            title: "Episode One".into(),
            audio_url: "https://cdn.example.com/ep1.mp3".into(),
            published: None,
            description: None,
            duration_secs: Some(1800),
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
        }
    }

    fn no_analyzer() -> AnalysisStage {
        AnalysisStage::new(None, fast_retry())
    }

    fn temp_media() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.mp3");
        fs_err::write(&path, b"fake audio").unwrap();
        (dir, path)
    }

    fn downloader_returning(path: &Path) -> MockMediaDownloader {
        let path = path.to_path_buf();
        let mut mock = MockMediaDownloader::new();
        mock.expect_download()
            .times(1)
            .returning(move |_| Ok(path.clone()));
        mock
    }

    fn transcriber_returning(text: &str, language: &str) -> MockTranscriber {
        let text = text.to_string();
        let language = language.to_string();
        let mut mock = MockTranscriber::new();
        mock.expect_transcribe().times(1).returning(move |_| {
            Ok(Transcription {
                text: text.clone(),
                language: language.clone(),
            })
        });
        mock
    }

    fn renderer_returning(path: &Path) -> MockRenderer {
        let path = path.to_path_buf();
        let mut mock = MockRenderer::new();
        mock.expect_render()
            .times(1)
            .returning(move |_, _, _, _| Ok(path.clone()));
        mock
    }

    fn pipeline(
        downloader: MockMediaDownloader,
        transcriber: MockTranscriber,
        analysis: AnalysisStage,
        renderer: MockRenderer,
        options: PipelineOptions,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(downloader),
            Arc::new(transcriber),
            analysis,
            Arc::new(renderer),
            options,
        )
    }

    #[tokio::test]
    async fn successful_run_redacts_and_renders() {
        let (_dir, media) = temp_media();
        let text = "Hello this is an ad buy now! Goodbye";

        let mut analyzer = MockTranscriptAnalyzer::new();
        analyzer
            .expect_summarize()
            .times(1)
            .returning(|_| Ok("greeting and farewell".into()));
        analyzer
            .expect_extract_topics()
            .times(1)
            .returning(|_| Ok(vec!["greetings".into()]));
        analyzer
            .expect_extract_keywords()
            .times(1)
            .returning(|_| Ok(vec!["hello".into()]));
        analyzer
            .expect_detect_ads()
            .times(1)
            .returning(|_| Ok(vec![Interval::new(6, 28)]));

        let mut renderer = MockRenderer::new();
        renderer
            .expect_render()
            .times(1)
            .withf(|_, _, redacted, language| {
                redacted == "Hello [AD REMOVED] Goodbye" && language == "en"
            })
            .returning(|_, _, _, _| Ok(PathBuf::from("out/episode-one.md")));

        let pipeline = pipeline(
            downloader_returning(&media),
            transcriber_returning(text, "en"),
            AnalysisStage::new(Some(Arc::new(analyzer)), fast_retry()),
            renderer,
            PipelineOptions::default(),
        );

        let result = pipeline.run(&episode()).await.unwrap();
        assert_eq!(result.output_path, PathBuf::from("out/episode-one.md"));
        assert_eq!(result.transcription_language, "en");
        assert_eq!(result.analysis.summary, "greeting and farewell");
        assert!(result.warnings.is_empty());
        assert!(!media.exists(), "media file should be deleted");
    }

    #[tokio::test]
    async fn download_failure_skips_all_later_stages() {
        let mut downloader = MockMediaDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("HTTP 404")));

        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().never();
        let mut renderer = MockRenderer::new();
        renderer.expect_render().never();

        let pipeline = pipeline(
            downloader,
            transcriber,
            no_analyzer(),
            renderer,
            PipelineOptions::default(),
        );

        let err = pipeline.run(&episode()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Download);
    }

    #[tokio::test]
    async fn transcribe_failure_still_cleans_up_media() {
        let (_dir, media) = temp_media();
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("engine crashed")));
        let mut renderer = MockRenderer::new();
        renderer.expect_render().never();

        let pipeline = pipeline(
            downloader_returning(&media),
            transcriber,
            no_analyzer(),
            renderer,
            PipelineOptions::default(),
        );

        let err = pipeline.run(&episode()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Transcribe);
        assert!(!media.exists(), "media file should be deleted on failure");
    }

    #[tokio::test]
    async fn render_failure_still_cleans_up_media() {
        let (_dir, media) = temp_media();
        let mut renderer = MockRenderer::new();
        renderer
            .expect_render()
            .times(1)
            .returning(|_, _, _, _| Err(anyhow::anyhow!("disk full")));

        let pipeline = pipeline(
            downloader_returning(&media),
            transcriber_returning("some text", "en"),
            no_analyzer(),
            renderer,
            PipelineOptions::default(),
        );

        let err = pipeline.run(&episode()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Render);
        assert!(!media.exists());
    }

    #[tokio::test]
    async fn keep_audio_retains_media_file() {
        let (_dir, media) = temp_media();
        let pipeline = pipeline(
            downloader_returning(&media),
            transcriber_returning("some text", "en"),
            no_analyzer(),
            renderer_returning(Path::new("out.md")),
            PipelineOptions {
                keep_audio: true,
                check_language: true,
            },
        );

        let result = pipeline.run(&episode()).await.unwrap();
        assert!(media.exists(), "media file should be retained");
        // degraded analysis (no credential) still renders full output
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn non_english_language_warns_before_analysis_warnings() {
        let (_dir, media) = temp_media();
        let pipeline = pipeline(
            downloader_returning(&media),
            transcriber_returning("ein text", "de"),
            no_analyzer(),
            renderer_returning(Path::new("out.md")),
            PipelineOptions::default(),
        );

        let result = pipeline.run(&episode()).await.unwrap();
        assert_eq!(result.transcription_language, "de");
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.warnings[0].stage, Stage::Transcribe);
        assert!(result.warnings[0].message.contains("\"de\""));
        assert_eq!(result.warnings[1].stage, Stage::Analysis);
    }

    #[tokio::test]
    async fn language_check_disabled_suppresses_warning() {
        let (_dir, media) = temp_media();
        let pipeline = pipeline(
            downloader_returning(&media),
            transcriber_returning("ein text", "de"),
            no_analyzer(),
            renderer_returning(Path::new("out.md")),
            PipelineOptions {
                keep_audio: false,
                check_language: false,
            },
        );

        let result = pipeline.run(&episode()).await.unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].stage, Stage::Analysis);
    }

    #[tokio::test]
    async fn analysis_rate_limit_aborts_before_render() {
        let (_dir, media) = temp_media();
        let mut analyzer = MockTranscriptAnalyzer::new();
        analyzer
            .expect_summarize()
            .times(1)
            .returning(|_| Err(LlmError::RateLimited));
        analyzer.expect_extract_topics().never();
        analyzer.expect_extract_keywords().never();
        analyzer.expect_detect_ads().never();

        let mut renderer = MockRenderer::new();
        renderer.expect_render().never();

        let pipeline = pipeline(
            downloader_returning(&media),
            transcriber_returning("some text", "en"),
            AnalysisStage::new(Some(Arc::new(analyzer)), fast_retry()),
            renderer,
            PipelineOptions::default(),
        );

        let err = pipeline.run(&episode()).await.unwrap_err();
        assert!(matches!(err, StageError::Analysis(LlmError::RateLimited)));
        assert!(!media.exists(), "cleanup still runs after an analysis abort");
    }

    #[test]
    fn english_detection_accepts_common_spellings() {
        assert!(is_english("en"));
        assert!(is_english("EN"));
        assert!(is_english("en-US"));
        assert!(is_english("English"));
        assert!(!is_english("de"));
        assert!(!is_english("fr-FR"));
    }

    #[test]
    fn stage_error_reports_its_stage() {
        assert_eq!(
            StageError::Download(anyhow::anyhow!("x")).stage(),
            Stage::Download
        );
        assert_eq!(
            StageError::Analysis(LlmError::RateLimited).stage(),
            Stage::Analysis
        );
        assert_eq!(StageError::Render(anyhow::anyhow!("x")).stage(), Stage::Render);
    }
}
