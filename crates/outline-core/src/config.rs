//! Session configuration
//!
//! Every field has a default, so an empty TOML file is a valid config.
//!
//! ```toml
//! model = "gemini-2.5-flash"
//! retries = 5
//! roadmap_system_prompt = "Break the topic down one line per node ..."
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default OpenAI-compatible chat completions endpoint
pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";

/// Default environment variable holding the bearer token
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Assistant content shown until the first fragment arrives
pub const DEFAULT_PLACEHOLDER: &str = "...";

/// Outline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineConfig {
    /// Chat completions URL
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Model name sent with every request
    pub model: String,
    /// Thinking budget for breakdown requests
    pub roadmap_thinking_budget: u32,
    /// Thinking budget for chat requests
    pub chat_thinking_budget: u32,
    /// Attempts per request, including the first
    pub retries: u32,
    /// Base delay between attempts in milliseconds, doubled each retry
    pub backoff_ms: u64,
    /// Longest accepted topic, in characters
    pub max_topic_len: usize,
    /// Placeholder content of a pending assistant message
    pub placeholder: String,
    /// System prompt for breakdown requests
    pub roadmap_system_prompt: Option<String>,
    /// System prompt for chat requests
    pub chat_system_prompt: Option<String>,
    /// Offer the unterminated last line as a record after a clean stream end
    ///
    /// Off by default: an undelimited remainder is never a complete record.
    pub flush_trailing_record: bool,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            model: DEFAULT_MODEL.to_string(),
            roadmap_thinking_budget: 0,
            chat_thinking_budget: 128,
            retries: 3,
            backoff_ms: 500,
            max_topic_len: 500,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            roadmap_system_prompt: None,
            chat_system_prompt: None,
            flush_trailing_record: false,
        }
    }
}

impl OutlineConfig {
    /// Create config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text and validate
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), model = %config.model, "loaded config");
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retries == 0 {
            return Err(ConfigError::Invalid("retries must be at least 1".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        if self.placeholder.is_empty() {
            return Err(ConfigError::Invalid("placeholder must not be empty".into()));
        }
        if self.max_topic_len == 0 {
            return Err(ConfigError::Invalid("max_topic_len must be at least 1".into()));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        exponential_backoff(Duration::from_millis(self.backoff_ms), attempt)
    }

    /// Set endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set retry attempts and base backoff
    #[must_use]
    pub fn with_retries(mut self, retries: u32, backoff_ms: u64) -> Self {
        self.retries = retries;
        self.backoff_ms = backoff_ms;
        self
    }

    /// Set breakdown system prompt
    #[must_use]
    pub fn with_roadmap_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.roadmap_system_prompt = Some(prompt.into());
        self
    }

    /// Set chat system prompt
    #[must_use]
    pub fn with_chat_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.chat_system_prompt = Some(prompt.into());
        self
    }

    /// Set trailing record flush
    #[must_use]
    pub fn with_flush_trailing_record(mut self, flush: bool) -> Self {
        self.flush_trailing_record = flush;
        self
    }

    /// Set maximum topic length
    #[must_use]
    pub fn with_max_topic_len(mut self, len: usize) -> Self {
        self.max_topic_len = len;
        self
    }
}

/// `base * 2^attempt`, the exponent capped at 16
pub(crate) fn exponential_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.min(16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(OutlineConfig::from_toml_str("").unwrap(), OutlineConfig::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = OutlineConfig::from_toml_str("model = \"m\"\nretries = 5\n").unwrap();
        assert_eq!(config.model, "m");
        assert_eq!(config.retries, 5);
        assert_eq!(config.placeholder, DEFAULT_PLACEHOLDER);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            OutlineConfig::from_toml_str("retries = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            OutlineConfig::from_toml_str("model = \" \""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            OutlineConfig::from_toml_str("retries = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn trailing_record_is_not_flushed_by_default() {
        assert!(!OutlineConfig::default().flush_trailing_record);
        let config = OutlineConfig::from_toml_str("flush_trailing_record = true").unwrap();
        assert!(config.flush_trailing_record);
    }

    #[test]
    fn backoff_doubles() {
        let config = OutlineConfig::new().with_retries(3, 500);
        assert_eq!(config.backoff(0), Duration::from_millis(500));
        assert_eq!(config.backoff(1), Duration::from_millis(1000));
        assert_eq!(config.backoff(2), Duration::from_millis(2000));
        assert_eq!(config.backoff(40), config.backoff(16));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chat_thinking_budget = 64").unwrap();
        let config = OutlineConfig::load(file.path()).unwrap();
        assert_eq!(config.chat_thinking_budget, 64);

        assert!(matches!(
            OutlineConfig::load("/definitely/not/here.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
