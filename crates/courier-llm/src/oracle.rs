use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::{CourierConfig, OracleProvider};
use courier_core::{ConversationRecord, CourierError, Result};

use crate::anthropic::AnthropicOracle;
use crate::openai::OpenAiOracle;

/// Marker appended to truncated replies.
pub const ELLIPSIS: &str = "...";

/// Produces reply text for a channel message.
#[async_trait]
pub trait ReplyOracle: Send + Sync {
    /// Provider name, e.g. "anthropic".
    fn name(&self) -> &str;

    /// Generate a reply to `user_text`. `history` holds the channel's recent
    /// turns, oldest first, not including `user_text` itself.
    async fn generate(&self, user_text: &str, history: &[ConversationRecord]) -> Result<String>;
}

/// Generation parameters shared by the HTTP oracles.
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OracleSettings {
    pub fn from_config(config: &CourierConfig) -> Self {
        Self {
            model: config.oracle.model.clone(),
            system_prompt: config.oracle.system_prompt.clone(),
            max_tokens: config.oracle.max_tokens,
            temperature: config.oracle.temperature,
            timeout: Duration::from_secs(config.network.request_timeout_secs),
        }
    }
}

/// Build the configured oracle. Fails if no API key is available.
pub fn from_config(config: &CourierConfig) -> Result<Arc<dyn ReplyOracle>> {
    let api_key = config
        .oracle
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| CourierError::ConfigValidation {
            field: "oracle.api_key".into(),
            reason: "no API key configured for the reply oracle".into(),
        })?;
    let settings = OracleSettings::from_config(config);

    let oracle: Arc<dyn ReplyOracle> = match config.oracle.provider {
        OracleProvider::Anthropic => {
            let mut o = AnthropicOracle::new(api_key, settings)?;
            if let Some(url) = &config.oracle.base_url {
                o = o.with_base_url(url.clone());
            }
            Arc::new(o)
        }
        OracleProvider::OpenAi => {
            let mut o = OpenAiOracle::new(api_key, settings)?;
            if let Some(url) = &config.oracle.base_url {
                o = o.with_base_url(url.clone());
            }
            Arc::new(o)
        }
    };
    Ok(oracle)
}

/// Cap `text` at `max_chars` characters, ending in `...` when cut.
pub fn truncate_reply(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_replies_pass_through() {
        assert_eq!(truncate_reply("hello", 10), "hello");
        assert_eq!(truncate_reply("0123456789", 10), "0123456789");
    }

    #[test]
    fn long_replies_end_in_ellipsis_within_limit() {
        let out = truncate_reply("0123456789abc", 10);
        assert_eq!(out, "0123456...");
        assert_eq!(out.chars().count(), 10);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let out = truncate_reply("ééééééééé", 5);
        assert_eq!(out, "éé...");
    }
}
