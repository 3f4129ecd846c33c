use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::completion::request::GenerationRequest, models::ModelOptions, Ollama,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::CompletionError,
    settings::{LlmMode, LlmSettings},
};

/// A single request/response text completion.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Locally hosted model served by Ollama.
pub struct OllamaCompletion {
    client: Ollama,
    model: String,
    temperature: f32,
}

impl OllamaCompletion {
    pub fn new(host: &str, port: u16, model: &str, temperature: f32) -> Self {
        Self {
            client: Ollama::new(host.to_string(), port),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl CompletionService for OllamaCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        debug!(model = %self.model, "sending prompt to Ollama");
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string())
            .options(ModelOptions::default().temperature(self.temperature));
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| CompletionError::Ollama(e.to_string()))?;
        non_empty(response.response)
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

/// Hosted model behind an OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompletion {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompletion {
    pub fn new(base_url: &str, api_key: &str, model: &str, temperature: f32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        debug!(model = %self.model, "sending prompt to hosted completion API");
        let body = OpenAiRequest {
            model: &self.model,
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, message });
        }

        let data: OpenAiResponse = resp.json().await?;
        let content = data
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        non_empty(content)
    }
}

fn non_empty(text: String) -> Result<String, CompletionError> {
    if text.trim().is_empty() {
        Err(CompletionError::Empty)
    } else {
        Ok(text)
    }
}

/// Builds the completion backend selected by the settings.
pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn CompletionService>> {
    match settings.mode {
        LlmMode::Local => {
            info!(
                "Using local completion model '{}' at {}:{}",
                settings.local_model, settings.ollama_host, settings.ollama_port
            );
            Ok(Arc::new(OllamaCompletion::new(
                &settings.ollama_host,
                settings.ollama_port,
                &settings.local_model,
                settings.temperature,
            )))
        }
        LlmMode::Hosted => {
            let Some(api_key) = settings.api_key.as_deref().filter(|k| k.starts_with("sk-"))
            else {
                bail!("hosted mode requires an API key starting with \"sk-\"");
            };
            info!(
                "Using hosted completion model '{}' at {}",
                settings.hosted_model, settings.hosted_base_url
            );
            Ok(Arc::new(OpenAiCompletion::new(
                &settings.hosted_base_url,
                api_key,
                &settings.hosted_model,
                settings.temperature,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: LlmMode, api_key: Option<&str>) -> LlmSettings {
        LlmSettings {
            mode,
            api_key: api_key.map(str::to_string),
            ..LlmSettings::default()
        }
    }

    #[test]
    fn local_mode_needs_no_key() {
        assert!(from_settings(&settings(LlmMode::Local, None)).is_ok());
    }

    #[test]
    fn hosted_mode_requires_valid_key() {
        assert!(from_settings(&settings(LlmMode::Hosted, None)).is_err());
        assert!(from_settings(&settings(LlmMode::Hosted, Some("not-a-key"))).is_err());
        assert!(from_settings(&settings(LlmMode::Hosted, Some("sk-test"))).is_ok());
    }

    #[test]
    fn blank_replies_are_errors() {
        assert!(matches!(non_empty("  \n".to_string()), Err(CompletionError::Empty)));
        assert_eq!(non_empty("ok".to_string()).unwrap(), "ok");
    }
}
