use async_trait::async_trait;
use courier_core::{ConversationRecord, CourierError, Result, Role};
use reqwest::Client;
use tracing::debug;

use crate::oracle::{OracleSettings, ReplyOracle};

/// Reply oracle backed by the OpenAI Chat Completions API (or any
/// compatible endpoint via `with_base_url`).
pub struct OpenAiOracle {
    client: Client,
    api_key: String,
    base_url: String,
    settings: OracleSettings,
}

impl OpenAiOracle {
    pub fn new(api_key: String, settings: OracleSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CourierError::Oracle(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: "https://api.openai.com/v1".into(),
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
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(ref system) = self.settings.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        for r in history {
            let role = match r.role {
                Role::User => "user",
                Role::Agent => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": r.text }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": user_text }));

        serde_json::json!({
            "model": &self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "messages": messages,
        })
    }
}

#[async_trait]
impl ReplyOracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, user_text: &str, history: &[ConversationRecord]) -> Result<String> {
        let body = self.build_request_body(user_text, history);
        debug!(model = %self.settings.model, turns = history.len(), "sending OpenAI API request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(content)
    }
}
