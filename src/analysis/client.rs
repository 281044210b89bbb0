use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::redact::Interval;
use crate::retry::{ClassifyError, ErrorClass};

/// Typed failure of a single LLM call.
///
/// Variants map one-to-one onto retry classes so the policy layer never has
/// to inspect transport details.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("quota exhausted")]
    QuotaExhausted,

    #[error("auth token rejected")]
    AuthExpired,

    #[error("server error: HTTP {status}")]
    Server { status: u16 },

    #[error("connection failed: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("request rejected: HTTP {status}: {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ClassifyError for LlmError {
    fn class(&self) -> ErrorClass {
        match self {
            LlmError::RateLimited | LlmError::QuotaExhausted => ErrorClass::FatalImmediate,
            LlmError::Server { .. } | LlmError::Connection(_) | LlmError::AuthExpired => {
                ErrorClass::RetryableTransient
            }
            LlmError::InvalidRequest { .. } | LlmError::Malformed(_) => ErrorClass::FatalClient,
        }
    }
}

/// The four independent transcript extractions the pipeline asks for.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptAnalyzer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, LlmError>;

    async fn extract_topics(&self, text: &str) -> Result<Vec<String>, LlmError>;

    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, LlmError>;

    /// Advertising spans as half-open character offsets into `text`.
    async fn detect_ads(&self, text: &str) -> Result<Vec<Interval>, LlmError>;
}

const SUMMARY_PROMPT: &str =
    "Summarize this podcast episode transcript in two or three paragraphs. \
     Respond with the summary text only.";

const TOPICS_PROMPT: &str =
    "List the main topics discussed in this podcast episode transcript. \
     Respond with a JSON array of short topic strings and nothing else.";

const KEYWORDS_PROMPT: &str =
    "Extract up to fifteen keywords from this podcast episode transcript. \
     Respond with a JSON array of keyword strings and nothing else.";

const ADS_PROMPT: &str =
    "Identify advertising or sponsor-read segments in this podcast episode \
     transcript. Respond with a JSON array of objects of the form \
     {\"start\": <int>, \"end\": <int>} where start and end are character \
     offsets into the transcript (end exclusive). Respond with the JSON \
     array and nothing else.";

/// Chat-completions client for an OpenAI-compatible endpoint.
pub struct ChatAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl ChatAnalyzer {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    async fn complete(&self, instruction: &str, transcript: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instruction,
                },
                ChatMessage {
                    role: "user",
                    content: transcript,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            return Err(match code {
                429 => {
                    let body = response.text().await.unwrap_or_default();
                    if body.contains("quota") {
                        LlmError::QuotaExhausted
                    } else {
                        LlmError::RateLimited
                    }
                }
                401 => LlmError::AuthExpired,
                500..=599 => LlmError::Server { status: code },
                _ => {
                    let message = response.text().await.unwrap_or_default();
                    LlmError::InvalidRequest { status: code, message }
                }
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed("response contained no choices".into()))
    }
}

#[async_trait]
impl TranscriptAnalyzer for ChatAnalyzer {
    async fn summarize(&self, text: &str) -> Result<String, LlmError> {
        let content = self.complete(SUMMARY_PROMPT, text).await?;
        Ok(content.trim().to_string())
    }

    async fn extract_topics(&self, text: &str) -> Result<Vec<String>, LlmError> {
        let content = self.complete(TOPICS_PROMPT, text).await?;
        parse_string_array(&content)
    }

    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, LlmError> {
        let content = self.complete(KEYWORDS_PROMPT, text).await?;
        parse_string_array(&content)
    }

    async fn detect_ads(&self, text: &str) -> Result<Vec<Interval>, LlmError> {
        let content = self.complete(ADS_PROMPT, text).await?;
        parse_ad_spans(&content)
    }
}

/// Strip a Markdown code fence if the model wrapped its answer in one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop an optional language tag on the fence line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_string_array(content: &str) -> Result<Vec<String>, LlmError> {
    let body = strip_code_fence(content);
    serde_json::from_str::<Vec<String>>(body)
        .map_err(|e| LlmError::Malformed(format!("expected JSON string array: {e}")))
}

fn parse_ad_spans(content: &str) -> Result<Vec<Interval>, LlmError> {
    let body = strip_code_fence(content);
    serde_json::from_str::<Vec<Interval>>(body)
        .map_err(|e| LlmError::Malformed(format!("expected JSON span array: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_quota_are_fatal_immediate() {
        assert_eq!(LlmError::RateLimited.class(), ErrorClass::FatalImmediate);
        assert_eq!(LlmError::QuotaExhausted.class(), ErrorClass::FatalImmediate);
    }

    #[test]
    fn server_and_auth_errors_are_transient() {
        assert_eq!(
            LlmError::Server { status: 503 }.class(),
            ErrorClass::RetryableTransient
        );
        assert_eq!(LlmError::AuthExpired.class(), ErrorClass::RetryableTransient);
    }

    #[test]
    fn invalid_request_and_malformed_are_client_fatal() {
        let invalid = LlmError::InvalidRequest {
            status: 400,
            message: "bad prompt".into(),
        };
        assert_eq!(invalid.class(), ErrorClass::FatalClient);
        assert_eq!(
            LlmError::Malformed("not json".into()).class(),
            ErrorClass::FatalClient
        );
    }

    #[test]
    fn parses_plain_string_array() {
        let parsed = parse_string_array(r#"["ai", "rust", "podcasts"]"#).unwrap();
        assert_eq!(parsed, vec!["ai", "rust", "podcasts"]);
    }

    #[test]
    fn parses_fenced_string_array() {
        let content = "```json\n[\"economics\", \"history\"]\n```";
        let parsed = parse_string_array(content).unwrap();
        assert_eq!(parsed, vec!["economics", "history"]);
    }

    #[test]
    fn rejects_non_array_content() {
        let err = parse_string_array("I couldn't find any topics.").unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }

    #[test]
    fn parses_ad_spans_with_negative_and_overlapping_values() {
        // raw spans pass through untouched; normalization happens downstream
        let parsed =
            parse_ad_spans(r#"[{"start": -5, "end": 40}, {"start": 30, "end": 60}]"#).unwrap();
        assert_eq!(parsed, vec![Interval::new(-5, 40), Interval::new(30, 60)]);
    }

    #[test]
    fn parses_fenced_ad_spans() {
        let content = "```\n[{\"start\": 10, \"end\": 20}]\n```";
        let parsed = parse_ad_spans(content).unwrap();
        assert_eq!(parsed, vec![Interval::new(10, 20)]);
    }

    #[test]
    fn rejects_malformed_spans() {
        let err = parse_ad_spans(r#"[{"begin": 1, "finish": 2}]"#).unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }

    #[test]
    fn strip_code_fence_leaves_bare_content_alone() {
        assert_eq!(strip_code_fence("  [1, 2]  "), "[1, 2]");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
    }
}
