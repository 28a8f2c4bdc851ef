//! Local backend: Ollama `/api/chat` with NDJSON streaming.
//!
//! Each body line is a JSON object carrying `message.content`; the last
//! one has `"done": true`.  The model is kept resident (`keep_alive: -1`)
//! and reasoning output is disabled (`think: false`) so the first token
//! arrives as early as possible.

use std::io::BufReader;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::config::LocalLlmConfig;
use crate::llm::generator::{GenerationError, LineEvent, LineTokens, ResponseGenerator, TokenStream};

pub struct OllamaGenerator {
    client: reqwest::blocking::Client,
    config: LocalLlmConfig,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl OllamaGenerator {
    pub fn from_config(config: &LocalLlmConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    /// Load the model into memory with a throwaway request.
    pub fn warm_up(&self) -> Result<Duration, GenerationError> {
        let start = Instant::now();
        for token in self.stream("hi")? {
            token?;
        }
        let elapsed = start.elapsed();
        log::info!(
            "local model '{}' warm ({:.0} ms)",
            self.config.model,
            elapsed.as_secs_f64() * 1_000.0
        );
        Ok(elapsed)
    }
}

fn parse_line(line: &str) -> LineEvent {
    let chunk: ChatChunk = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => return LineEvent::Error(GenerationError::Malformed(e.to_string())),
    };
    if let Some(err) = chunk.error {
        return LineEvent::Error(GenerationError::Backend(err));
    }

    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    match (content.is_empty(), chunk.done) {
        (true, true) => LineEvent::Done,
        (true, false) => LineEvent::Skip,
        (false, true) => LineEvent::FinalToken(content),
        (false, false) => LineEvent::Token(content),
    }
}

impl ResponseGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "local"
    }

    fn stream(&self, prompt: &str) -> Result<TokenStream, GenerationError> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model":      self.config.model,
            "messages":   [{ "role": "user", "content": prompt }],
            "stream":     true,
            "keep_alive": -1,
            "think":      false,
            "options":    { "num_predict": self.config.num_predict },
        });

        let response = self.client.post(&url).json(&body).send()?;
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
