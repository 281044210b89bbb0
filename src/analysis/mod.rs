use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Stage, StageError, StageOutcome, Warning};
use crate::redact::Interval;
use crate::retry::{run_with_retry, RetryConfig, RetryError};

pub mod client;

pub use client::{ChatAnalyzer, LlmError, TranscriptAnalyzer};

/// Everything the language model produced for one transcript.
///
/// Each field defaults to empty when its extraction failed; there is no
/// cross-field invariant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub ad_intervals: Vec<Interval>,
}

/// Runs the four transcript extractions, isolating failures per extraction.
///
/// A sub-extraction that fails after retries (or is rejected outright) leaves
/// its field empty and records a warning; the remaining extractions still
/// run. A rate-limit or quota failure aborts the whole stage and discards
/// any earlier successes, so the pipeline never renders partial data that
/// was cut short mid-batch.
pub struct AnalysisStage {
    analyzer: Option<Arc<dyn TranscriptAnalyzer>>,
    retry: RetryConfig,
}

impl AnalysisStage {
    /// `analyzer` is `None` when no API credential is configured; the stage
    /// then degrades to an empty result without making any call.
    pub fn new(analyzer: Option<Arc<dyn TranscriptAnalyzer>>, retry: RetryConfig) -> Self {
        Self { analyzer, retry }
    }

    pub async fn run(&self, text: &str) -> StageOutcome<AnalysisResult> {
        let Some(analyzer) = &self.analyzer else {
            tracing::warn!("no API credential configured, skipping transcript analysis");
            return StageOutcome::Degraded(
                AnalysisResult::default(),
                vec![Warning::new(
                    Stage::Analysis,
                    "no API credential configured; analysis skipped",
                )],
            );
        };

        let mut result = AnalysisResult::default();
        let mut warnings = Vec::new();

        tracing::info!("extracting summary");
        match run_with_retry(&self.retry, || analyzer.summarize(text)).await {
            Ok(summary) => result.summary = summary,
            Err(RetryError::Aborted(e)) => return StageOutcome::Fatal(StageError::Analysis(e)),
            Err(e) => warnings.push(Warning::new(
                Stage::Analysis,
                format!("summary extraction failed: {e}"),
            )),
        }

        tracing::info!("extracting topics");
        match run_with_retry(&self.retry, || analyzer.extract_topics(text)).await {
            Ok(topics) => result.topics = topics,
            Err(RetryError::Aborted(e)) => return StageOutcome::Fatal(StageError::Analysis(e)),
            Err(e) => warnings.push(Warning::new(
                Stage::Analysis,
                format!("topics extraction failed: {e}"),
            )),
        }

        tracing::info!("extracting keywords");
        match run_with_retry(&self.retry, || analyzer.extract_keywords(text)).await {
            Ok(keywords) => result.keywords = keywords,
            Err(RetryError::Aborted(e)) => return StageOutcome::Fatal(StageError::Analysis(e)),
            Err(e) => warnings.push(Warning::new(
                Stage::Analysis,
                format!("keywords extraction failed: {e}"),
            )),
        }

        tracing::info!("detecting ad segments");
        match run_with_retry(&self.retry, || analyzer.detect_ads(text)).await {
            Ok(spans) => result.ad_intervals = spans,
            Err(RetryError::Aborted(e)) => return StageOutcome::Fatal(StageError::Analysis(e)),
            Err(e) => warnings.push(Warning::new(
                Stage::Analysis,
                format!("ad detection failed: {e}"),
            )),
        }

        if warnings.is_empty() {
            StageOutcome::Success(result)
        } else {
            StageOutcome::Degraded(result, warnings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::client::MockTranscriptAnalyzer;
    use super::*;
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
        }
    }

    fn stage(mock: MockTranscriptAnalyzer) -> AnalysisStage {
        AnalysisStage::new(Some(Arc::new(mock)), fast_retry())
    }

    #[tokio::test]
    async fn missing_credential_degrades_without_calls() {
        let stage = AnalysisStage::new(None, fast_retry());
        let outcome = stage.run("transcript").await;

        let StageOutcome::Degraded(result, warnings) = outcome else {
            panic!("expected degraded outcome");
        };
        assert!(result.summary.is_empty());
        assert!(result.topics.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("credential"));
    }

    #[tokio::test]
    async fn all_extractions_succeed() {
        let mut mock = MockTranscriptAnalyzer::new();
        mock.expect_summarize()
            .times(1)
            .returning(|_| Ok("a fine episode".into()));
        mock.expect_extract_topics()
            .times(1)
            .returning(|_| Ok(vec!["rust".into()]));
        mock.expect_extract_keywords()
            .times(1)
            .returning(|_| Ok(vec!["async".into(), "retry".into()]));
        mock.expect_detect_ads()
            .times(1)
            .returning(|_| Ok(vec![Interval::new(5, 10)]));

        let outcome = stage(mock).run("transcript").await;

        let StageOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.summary, "a fine episode");
        assert_eq!(result.topics, vec!["rust"]);
        assert_eq!(result.keywords.len(), 2);
        assert_eq!(result.ad_intervals, vec![Interval::new(5, 10)]);
    }

    #[tokio::test]
    async fn rejected_topics_call_is_isolated() {
        let mut mock = MockTranscriptAnalyzer::new();
        mock.expect_summarize()
            .times(1)
            .returning(|_| Ok("summary".into()));
        mock.expect_extract_topics().times(1).returning(|_| {
            Err(LlmError::InvalidRequest {
                status: 400,
                message: "prompt too long".into(),
            })
        });
        mock.expect_extract_keywords()
            .times(1)
            .returning(|_| Ok(vec!["kw".into()]));
        mock.expect_detect_ads().times(1).returning(|_| Ok(vec![]));

        let outcome = stage(mock).run("transcript").await;

        let StageOutcome::Degraded(result, warnings) = outcome else {
            panic!("expected degraded outcome");
        };
        assert_eq!(result.summary, "summary");
        assert!(result.topics.is_empty());
        assert_eq!(result.keywords, vec!["kw"]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("topics"));
    }

    #[tokio::test]
    async fn rate_limit_aborts_whole_batch() {
        let mut mock = MockTranscriptAnalyzer::new();
        mock.expect_summarize()
            .times(1)
            .returning(|_| Ok("summary".into()));
        mock.expect_extract_topics()
            .times(1)
            .returning(|_| Err(LlmError::RateLimited));
        // later sub-extractions must not run, prior success is discarded
        mock.expect_extract_keywords().never();
        mock.expect_detect_ads().never();

        let outcome = stage(mock).run("transcript").await;

        assert!(matches!(
            outcome,
            StageOutcome::Fatal(StageError::Analysis(LlmError::RateLimited))
        ));
    }

    #[tokio::test]
    async fn transient_exhaustion_degrades_one_field() {
        let mut mock = MockTranscriptAnalyzer::new();
        mock.expect_summarize()
            .times(3)
            .returning(|_| Err(LlmError::Server { status: 503 }));
        mock.expect_extract_topics()
            .times(1)
            .returning(|_| Ok(vec!["topic".into()]));
        mock.expect_extract_keywords()
            .times(1)
            .returning(|_| Ok(vec![]));
        mock.expect_detect_ads().times(1).returning(|_| Ok(vec![]));

        let outcome = stage(mock).run("transcript").await;

        let StageOutcome::Degraded(result, warnings) = outcome else {
            panic!("expected degraded outcome");
        };
        assert!(result.summary.is_empty());
        assert_eq!(result.topics, vec!["topic"]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("summary"));
    }

    #[tokio::test]
    async fn multiple_failed_extractions_accumulate_warnings_in_order() {
        let mut mock = MockTranscriptAnalyzer::new();
        mock.expect_summarize().times(1).returning(|_| {
            Err(LlmError::InvalidRequest {
                status: 422,
                message: "no".into(),
            })
        });
        mock.expect_extract_topics()
            .times(1)
            .returning(|_| Ok(vec!["t".into()]));
        mock.expect_extract_keywords()
            .times(1)
            .returning(|_| Err(LlmError::Malformed("not json".into())));
        mock.expect_detect_ads().times(1).returning(|_| Ok(vec![]));

        let outcome = stage(mock).run("transcript").await;

        let StageOutcome::Degraded(_, warnings) = outcome else {
            panic!("expected degraded outcome");
        };
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].message.contains("summary"));
        assert!(warnings[1].message.contains("keywords"));
    }
}
