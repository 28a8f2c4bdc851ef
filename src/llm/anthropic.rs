//! Remote backend: Anthropic Messages API with server-sent events.
//!
//! Text arrives as `content_block_delta` events; `message_stop` ends the
//! reply.  The backend counts as available only when an API key was given
//! in the config or found in `ANTHROPIC_API_KEY`.

use std::io::BufReader;
use std::time::Duration;

use serde::Deserialize;

use crate::config::RemoteLlmConfig;
use crate::llm::generator::{GenerationError, LineEvent, LineTokens, ResponseGenerator, TokenStream};

const API_VERSION: &str = "2023-06-01";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

pub struct AnthropicGenerator {
    client: reqwest::blocking::Client,
    config: RemoteLlmConfig,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl AnthropicGenerator {
    /// An explicit key in `config` wins over the environment.
    pub fn from_config(config: &RemoteLlmConfig) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty());
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &RemoteLlmConfig, api_key: Option<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            config: config.clone(),
            api_key,
        }
    }
}

fn parse_line(line: &str) -> LineEvent {
    // `event:` lines repeat the type that the `data:` payload carries.
    let Some(data) = line.strip_prefix("data:") else {
        return LineEvent::Skip;
    };
    match serde_json::from_str::<StreamEvent>(data.trim()) {
        Ok(StreamEvent::ContentBlockDelta { delta }) => match delta.text {
            Some(t) if !t.is_empty() => LineEvent::Token(t),
            _ => LineEvent::Skip,
        },
        Ok(StreamEvent::MessageStop) => LineEvent::Done,
        Ok(StreamEvent::Error { error }) => LineEvent::Error(GenerationError::Backend(error.message)),
        Ok(StreamEvent::Other) => LineEvent::Skip,
        Err(e) => LineEvent::Error(GenerationError::Malformed(e.to_string())),
    }
}

impl ResponseGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "remote"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn stream(&self, prompt: &str) -> Result<TokenStream, GenerationError> {
        let key = self.api_key.as_deref().ok_or(GenerationError::NoBackend)?;

        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model":      self.config.model,
            "max_tokens": self.config.max_tokens,
            "system":     self.config.system_prompt,
            "stream":     true,
            "messages":   [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        Ok(Box::new(LineTokens::new(BufReader::new(response), parse_line)))
    }
}
