//! OpenAI-compatible chat-completion merge engine.
//!
//! Sends one `POST {base_url}/chat/completions` per conflicted file. There are
//! no retries and no streaming: a failed call leaves the file conflicted.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::engine::MergeEngine;
use super::prompt::{build_messages, ChatMessage};
use crate::errors::AiError;
use crate::models::{AiMergePrefs, AiMergeResult, ConflictContext};

/// Connection settings for an OpenAI-compatible provider.
///
/// Built once by the host and passed in; the engine never reads settings on
/// its own.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    /// May be empty when the deployment does not require a key.
    pub api_key: String,
    pub require_api_key: bool,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: String::new(),
            require_api_key: true,
            timeout_secs: 120,
        }
    }
}

impl ProviderSettings {
    /// True when the key is required but blank.
    pub fn missing_required_key(&self) -> bool {
        self.require_api_key && self.api_key.trim().is_empty()
    }

    /// The `Authorization` header is sent unless no key is required and
    /// none is supplied.
    pub fn sends_authorization(&self) -> bool {
        self.require_api_key || !self.api_key.trim().is_empty()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Merge engine backed by a chat-completion endpoint.
pub struct OpenAiCompatibleEngine {
    settings: ProviderSettings,
    http: reqwest::Client,
}

impl OpenAiCompatibleEngine {
    /// Create a new engine from provider settings.
    pub fn new(settings: ProviderSettings) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        info!(
            base_url = %settings.base_url,
            model = %settings.model,
            "created OpenAI-compatible merge engine"
        );
        Ok(Self { settings, http })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn request(
        &self,
        context: &ConflictContext,
        prefs: &AiMergePrefs,
    ) -> Result<String, AiError> {
        let body = ChatCompletionsRequest {
            model: &self.settings.model,
            max_tokens: prefs.max_tokens,
            temperature: prefs.temperature,
            messages: build_messages(context, prefs),
        };

        let mut request = self.http.post(self.settings.completions_url()).json(&body);
        if self.settings.sends_authorization() {
            request = request.bearer_auth(&self.settings.api_key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            debug!(status = %status, "completion endpoint returned error");
            return Err(AiError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatCompletionsResponse =
            serde_json::from_str(&text).map_err(|e| AiError::Decode(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or(AiError::NoContent)
    }
}

#[async_trait]
impl MergeEngine for OpenAiCompatibleEngine {
    #[instrument(
        skip(self, context, prefs),
        fields(file = %context.file_path, model = %self.settings.model)
    )]
    async fn merge(&self, context: &ConflictContext, prefs: &AiMergePrefs) -> AiMergeResult {
        debug!(
            language = ?prefs.language_hint,
            max_tokens = prefs.max_tokens,
            "requesting merge from provider"
        );
        match self.request(context, prefs).await {
            Ok(content) => {
                debug!(len = content.len(), "provider returned merged content");
                AiMergeResult::Success(content)
            }
            Err(e) => {
                debug!(error = %e, "AI merge failed");
                AiMergeResult::Failure(e.to_string())
            }
        }
    }

    fn preflight(&self) -> Result<(), AiError> {
        if self.settings.missing_required_key() {
            return Err(AiError::MissingApiKey);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}
