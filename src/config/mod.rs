use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryConfig;
use crate::utils::validate_and_normalize_url;

/// Environment variable holding the API key for transcription and analysis.
pub const API_KEY_ENV: &str = "PODSIFT_API_KEY";

/// Fallback environment variable, honored when `PODSIFT_API_KEY` is unset.
pub const API_KEY_FALLBACK_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// Transcription engine settings
    pub transcription: TranscriptionConfig,

    /// LLM analysis settings
    pub analysis: AnalysisConfig,

    /// Retry policy for analysis calls
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for rendered reports
    pub output_dir: PathBuf,

    /// Keep downloaded audio files after processing
    pub keep_audio: bool,

    /// Warn when the transcription language is not English
    pub check_language: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,

    /// Transcription model name
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,

    /// Chat model used for the analysis sub-extractions
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total calls allowed per analysis sub-extraction, including the first
    pub max_attempts: u32,

    /// Delay between attempts, in seconds
    pub delay_secs: u64,

    /// Per-retry delay multiplier; 1.0 keeps the delay fixed
    pub backoff_multiplier: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig {
                output_dir: PathBuf::from("transcripts"),
                keep_audio: false,
                check_language: true,
            },
            transcription: TranscriptionConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                model: "whisper-1".to_string(),
            },
            analysis: AnalysisConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
            },
            retry: RetrySettings {
                max_attempts: 3,
                delay_secs: 30,
                backoff_multiplier: 1.0,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content =
                fs_err::read_to_string(&config_path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("podsift").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        validate_and_normalize_url(&self.transcription.endpoint)
            .context("invalid transcription endpoint")?;
        validate_and_normalize_url(&self.analysis.endpoint).context("invalid analysis endpoint")?;

        if self.retry.backoff_multiplier <= 0.0 {
            anyhow::bail!("retry backoff multiplier must be positive");
        }

        Ok(())
    }

    /// API key from the environment, if configured.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(API_KEY_FALLBACK_ENV))
            .ok()
            .filter(|key| !key.is_empty())
    }

    /// Retry settings in the form the retry policy consumes.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            delay: Duration::from_secs(self.retry.delay_secs),
            backoff_multiplier: self.retry.backoff_multiplier,
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Output Directory: {}", self.app.output_dir.display());
        println!("  Keep Audio: {}", self.app.keep_audio);
        println!("  Language Check: {}", self.app.check_language);
        println!("  Transcription Endpoint: {}", self.transcription.endpoint);
        println!("  Transcription Model: {}", self.transcription.model);
        println!("  Analysis Endpoint: {}", self.analysis.endpoint);
        println!("  Analysis Model: {}", self.analysis.model);
        println!(
            "  Retry: {} attempts, {}s delay, x{} backoff",
            self.retry.max_attempts, self.retry.delay_secs, self.retry.backoff_multiplier
        );
        println!(
            "  API Key: {}",
            if self.api_key().is_some() {
                "configured"
            } else {
                "not configured"
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn invalid_endpoint_fails_validation() {
        let mut config = Config::default();
        config.analysis.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_backoff_fails_validation() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_settings_convert_to_policy_config() {
        let mut config = Config::default();
        config.retry.max_attempts = 5;
        config.retry.delay_secs = 2;
        config.retry.backoff_multiplier = 1.5;

        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.delay, Duration::from_secs(2));
        assert_eq!(retry.backoff_multiplier, 1.5);
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.app.output_dir, config.app.output_dir);
        assert_eq!(parsed.transcription.model, config.transcription.model);
        assert_eq!(parsed.retry.max_attempts, config.retry.max_attempts);
    }
}
