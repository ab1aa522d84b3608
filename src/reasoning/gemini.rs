//! HTTP reasoning backend for Gemini-style completion endpoints.
//!
//! Two request shapes are supported:
//! - Google AI Studio `generateContent` when the URL points at
//!   `generativelanguage.googleapis.com` (key in `x-goog-api-key`)
//! - a generic `{prompt, max_output_tokens}` body with bearer auth otherwise

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::error::BackendError;
use super::{parse, prompts, Expansion, ExpansionContext, ParentKind, ReasoningBackend};
use crate::config::ReasoningConfig;
use crate::models::KeyResultInput;

const GOOGLE_HOST: &str = "generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    api_url: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
    client: Client,
}

impl GeminiBackend {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            temperature,
            timeout,
            client,
        })
    }

    pub fn from_config(config: &ReasoningConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| BackendError::NotConfigured("no API key set".to_string()))?;
        Self::new(
            config.api_url.clone(),
            api_key,
            config.temperature,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn is_google(&self) -> bool {
        self.api_url.contains(GOOGLE_HOST)
    }

    /// Send one prompt and return the raw generated text.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError> {
        let request = if self.is_google() {
            self.client
                .post(&self.api_url)
                .header("x-goog-api-key", &self.api_key)
                .json(&json!({
                    "contents": [{ "parts": [{ "text": prompt }] }],
                    "generationConfig": {
                        "maxOutputTokens": max_tokens,
                        "temperature": self.temperature,
                    }
                }))
        } else {
            self.client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "prompt": prompt,
                    "max_output_tokens": max_tokens,
                }))
        };

        tracing::debug!(url = %self.api_url, max_tokens, "calling reasoning backend");
        let response = request.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await.map_err(|e| self.classify(e))?;
        parse::response_text(&body).ok_or_else(|| {
            BackendError::InvalidResponse("response carried no generated text".to_string())
        })
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else {
            BackendError::Network(err)
        }
    }
}

#[async_trait]
impl ReasoningBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn suggest(&self, objective: &str) -> Result<Vec<KeyResultInput>, BackendError> {
        let text = self
            .complete(&prompts::key_results(objective), prompts::KEY_RESULTS_MAX_TOKENS)
            .await?;
        parse::key_results(&text)
    }

    async fn expand(
        &self,
        context: &ExpansionContext,
        parent_kind: ParentKind,
        parent_id: &str,
    ) -> Result<Expansion, BackendError> {
        let missing = || {
            BackendError::InvalidResponse(format!(
                "no {} context supplied for {}",
                parent_kind, parent_id
            ))
        };

        match parent_kind {
            ParentKind::KeyResult => {
                let key_result = context.key_result.as_ref().ok_or_else(missing)?;
                let prompt = prompts::epics(&context.objective.text, key_result);
                let text = self.complete(&prompt, prompts::EPICS_MAX_TOKENS).await?;
                Ok(Expansion::Epics(parse::epics(&text)?))
            }
            ParentKind::Feature => {
                let feature = context.feature.as_ref().ok_or_else(missing)?;
                let text = self
                    .complete(&prompts::stories(feature), prompts::STORIES_MAX_TOKENS)
                    .await?;
                Ok(Expansion::Stories(parse::stories(&text)?))
            }
            ParentKind::Story => {
                let story = context.story.as_ref().ok_or_else(missing)?;
                let text = self
                    .complete(&prompts::tasks(story), prompts::TASKS_MAX_TOKENS)
                    .await?;
                Ok(Expansion::Tasks(parse::tasks(&text)?))
            }
        }
    }
}
