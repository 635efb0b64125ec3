use crate::error::{LeaseError, Result};
use crate::llm::types::*;
use reqwest::Client;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Chat-completions client. Constructed explicitly and passed into the
/// analyst -- no module-level singleton, so pipelines stay independently
/// testable.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Point at a compatible server (test doubles, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One completion round-trip. The returned text is untrusted free text;
    /// the validator layer is the only consumer.
    pub async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_prompt),
            ],
            temperature: 0.0,
            max_tokens: 4000,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let err_text = response.text().await?;
            return Err(LeaseError::ModelError(format!(
                "OpenAI API error (status {}): {}",
                status, err_text
            )));
        }

        let body: ChatCompletionResponse = response.json().await?;
        body.choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LeaseError::ModelError("Empty completion response".to_string()))
    }
}
