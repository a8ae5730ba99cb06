use super::parse::parse_instances;
use super::prompt::system_prompt;
use super::DetectError;
use crate::config::DetectorConfig;
use blackout_core::{PiiDetector, PiiInstance};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat completions request body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// PII detector backed by an OpenAI-compatible chat completions endpoint.
pub struct LlmDetector {
    config: DetectorConfig,
    system_prompt: String,
    api_key: Option<String>,
    client: Client,
}

impl LlmDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = config.api_key();
        if api_key.is_none() {
            log::warn!(
                "[Detect] {} is not set; calling {} without credentials",
                config.api_key_env,
                config.endpoint
            );
        }
        Ok(Self {
            system_prompt: system_prompt(&config.categories),
            api_key,
            config,
            client,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Sends one completion request and returns the message content.
    fn complete(&self, text: &str) -> Result<String, DetectError> {
        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DetectError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let reply: ChatResponse = response.json()?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(DetectError::EmptyResponse)
    }
}

impl PiiDetector for LlmDetector {
    fn detect(&self, text: &str) -> anyhow::Result<Vec<PiiInstance>> {
        log::debug!(
            "[Detect] {} chars to {} ({})",
            text.chars().count(),
            self.config.model,
            self.config.endpoint
        );
        let content = self.complete(text)?;
        let instances = parse_instances(&content)?;
        log::info!("[Detect] {} PII instances returned", instances.len());
        Ok(instances)
    }
}
