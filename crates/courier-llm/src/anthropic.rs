use async_trait::async_trait;
use courier_core::{ConversationRecord, CourierError, Result, Role};
use reqwest::Client;
use tracing::debug;

use crate::oracle::{OracleSettings, ReplyOracle};

/// Reply oracle backed by the Anthropic Messages API.
pub struct AnthropicOracle {
    client: Client,
    api_key: String,
    base_url: String,
    settings: OracleSettings,
}

impl AnthropicOracle {
    pub fn new(api_key: String, settings: OracleSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CourierError::Oracle(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: "https://api.anthropic.com/v1".into(),
            settings,
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub(crate) fn build_request_body(
        &self,
        user_text: &str,
        history: &[ConversationRecord],
    ) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = history
            .iter()
            .map(|r| {
                serde_json::json!({
                    "role": match r.role {
                        Role::User => "user",
                        Role::Agent => "assistant",
                    },
                    "content": r.text,
                })
            })
            .collect();
        messages.push(serde_json::json!({ "role": "user", "content": user_text }));

        let mut body = serde_json::json!({
            "model": &self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "messages": messages,
        });
        if let Some(ref system) = self.settings.system_prompt {
            body["system"] = serde_json::json!(system);
        }
        body
    }
}

#[async_trait]
impl ReplyOracle for AnthropicOracle {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, user_text: &str, history: &[ConversationRecord]) -> Result<String> {
        let body = self.build_request_body(user_text, history);
        debug!(model = %self.settings.model, turns = history.len(), "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CourierError::Oracle(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(CourierError::RateLimited {
                    retry_after_secs: 30,
                });
            }
            return Err(CourierError::Oracle(format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CourierError::Oracle(e.to_string()))?;

        let text = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}
