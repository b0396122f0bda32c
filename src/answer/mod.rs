// Answer module
// Builds the context prompt and asks a chat-completion server for an answer

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CompletionConfig;
use crate::retrieval::RetrievedChunk;
use crate::{KbError, Result};

const PROMPT_INSTRUCTION: &str =
    "Use the following context to help answer the question, be cautious of everything you read.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of an OpenAI-compatible chat completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Anything that can turn a chat request into the assistant's reply
pub trait CompletionEndpoint {
    fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Build the user prompt: numbered context excerpts followed by the question
#[inline]
pub fn build_prompt(question: &str, results: &[RetrievedChunk]) -> String {
    let mut context = String::new();
    for (i, result) in results.iter().enumerate() {
        let _ = write!(context, "[{}]{}\n\n", i + 1, result.text);
    }

    format!(
        "{}\n\nCONTEXT:\n{}\n\nQUESTION:\n{}\n\nAnswer:\n",
        PROMPT_INSTRUCTION, context, question
    )
}

/// Blocking HTTP client for an OpenAI-compatible `/v1/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    url: String,
    agent: ureq::Agent,
}

impl HttpCompletionClient {
    #[inline]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        // Error statuses still carry a body worth showing to the user
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            url: url.into(),
            agent,
        }
    }

    #[inline]
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self::new(
            config.url.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl CompletionEndpoint for HttpCompletionClient {
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = serde_json::to_string(request).map_err(|e| {
            KbError::Serialization(format!("Failed to encode completion request: {}", e))
        })?;

        debug!("Sending completion request to {}", self.url);

        let mut response = self
            .agent
            .post(self.url.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .map_err(|e| KbError::Upstream {
                message: format!("request to {} failed: {}", self.url, e),
                body: None,
            })?;

        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| KbError::Upstream {
                message: format!("failed to read response from {}: {}", self.url, e),
                body: None,
            })?;

        if !status.is_success() {
            warn!("Completion server returned HTTP {}", status.as_u16());
            return Err(KbError::Upstream {
                message: format!("HTTP {} from {}", status.as_u16(), self.url),
                body: Some(text),
            });
        }

        let parsed: ChatResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(KbError::Upstream {
                    message: format!("unexpected completion response: {}", e),
                    body: Some(text),
                });
            }
        };

        match parsed.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content),
            None => Err(KbError::Upstream {
                message: "completion response has no choices".to_string(),
                body: Some(text),
            }),
        }
    }
}

/// Turns retrieved context and a question into a generated answer
#[derive(Debug)]
pub struct AnswerGenerator<C> {
    endpoint: C,
    config: CompletionConfig,
}

impl<C: CompletionEndpoint> AnswerGenerator<C> {
    #[inline]
    pub fn new(endpoint: C, config: CompletionConfig) -> Self {
        Self { endpoint, config }
    }

    #[inline]
    pub fn endpoint(&self) -> &C {
        &self.endpoint
    }

    /// The request that `answer` would send for this question and context
    #[inline]
    pub fn request_for(&self, question: &str, results: &[RetrievedChunk]) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(self.config.system_prompt.as_str()),
                ChatMessage::user(build_prompt(question, results)),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    #[inline]
    pub fn answer(&self, question: &str, results: &[RetrievedChunk]) -> Result<String> {
        let request = self.request_for(question, results);
        debug!(
            "Requesting answer from model {} with {} context chunks",
            request.model,
            results.len()
        );
        self.endpoint.complete(&request)
    }
}
