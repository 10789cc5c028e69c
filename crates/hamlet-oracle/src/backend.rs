//! Language-model backends behind the [`TextOracle`] capability.
//!
//! The engine never assumes anything about the model beyond this contract:
//! send prompt text, get text back (plus a token count when the API reports
//! one), or a typed failure. [`HttpOracle`] speaks both supported wire
//! formats over `reqwest`. Tests plug in scripted implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::{BackendConfig, BackendType};
use crate::error::OracleError;

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// Text produced by one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// The model's reply.
    pub text: String,
    /// Total tokens billed for the call, when the API reports it.
    pub tokens_used: Option<u32>,
}

/// A text-generation endpoint.
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Generate a reply to `prompt` using at most `max_tokens` output tokens.
    ///
    /// Implementations map their own failures onto [`OracleError`]; they do
    /// not retry or enforce deadlines, the client does that.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Generation, OracleError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Shared handle to any backend.
pub type SharedOracle = Arc<dyn TextOracle>;

/// Build the HTTP backend described by `config`.
pub fn create_backend(config: &BackendConfig) -> SharedOracle {
    Arc::new(HttpOracle::new(config))
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// Sampling temperature sent to chat-completions endpoints.
const CHAT_TEMPERATURE: f64 = 0.8;

/// Version pin required by the Messages API.
const MESSAGES_API_VERSION: &str = "2023-06-01";

/// Wait suggested when an endpoint answers 429 without saying how long.
const BACKEND_RETRY_AFTER: Duration = Duration::from_secs(5);

/// One language-model endpoint reached over HTTP.
///
/// The wire format is fixed at construction: chat completions
/// (`{api_url}/chat/completions`, bearer auth) or messages
/// (`{api_url}/messages`, `x-api-key` auth).
pub struct HttpOracle {
    http: reqwest::Client,
    wire: BackendType,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpOracle {
    /// Prepare a backend for `config`. No request is made here.
    pub fn new(config: &BackendConfig) -> Self {
        let base = config.api_url.trim_end_matches('/');
        let endpoint = match config.backend_type {
            BackendType::OpenAi => format!("{base}/chat/completions"),
            BackendType::Anthropic => format!("{base}/messages"),
        };
        Self {
            http: reqwest::Client::new(),
            wire: config.backend_type,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// URL every request is posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, prompt: &str, max_tokens: u32) -> reqwest::RequestBuilder {
        let messages = serde_json::json!([{ "role": "user", "content": prompt }]);
        let request = self.http.post(&self.endpoint);
        match self.wire {
            BackendType::OpenAi => request.bearer_auth(&self.api_key).json(&serde_json::json!({
                "model": self.model,
                "messages": messages,
                "temperature": CHAT_TEMPERATURE,
                "max_tokens": max_tokens,
            })),
            BackendType::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", MESSAGES_API_VERSION)
                .json(&serde_json::json!({
                    "model": self.model,
                    "max_tokens": max_tokens,
                    "messages": messages,
                })),
        }
    }
}

#[async_trait]
impl TextOracle for HttpOracle {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Generation, OracleError> {
        let response = self
            .request(prompt, max_tokens)
            .send()
            .await
            .map_err(|e| transport_failure(self.name(), &e))?;
        let body = checked_body(self.name(), response).await?;
        decode_generation(self.wire, &body)
    }

    fn name(&self) -> &str {
        match self.wire {
            BackendType::OpenAi => "openai-compatible",
            BackendType::Anthropic => "anthropic",
        }
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

#[derive(Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Decode a successful response body in the given wire format.
fn decode_generation(wire: BackendType, body: &str) -> Result<Generation, OracleError> {
    let (text, tokens) = match wire {
        BackendType::OpenAi => {
            let reply: ChatReply = serde_json::from_str(body)?;
            let text = reply.choices.into_iter().next().and_then(|c| c.message.content);
            (text, reply.usage.map(|u| u.total_tokens))
        }
        BackendType::Anthropic => {
            let reply: MessagesReply = serde_json::from_str(body)?;
            let text = reply.content.into_iter().find_map(|block| block.text);
            let tokens = reply
                .usage
                .map(|u| u.input_tokens.saturating_add(u.output_tokens));
            (text, tokens)
        }
    };
    let text = text.ok_or_else(|| {
        OracleError::MalformedResponse(format!("{wire:?} reply carried no text"))
    })?;
    Ok(Generation {
        text,
        tokens_used: tokens.and_then(|t| u32::try_from(t).ok()),
    })
}

fn transport_failure(backend: &str, err: &reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout(Duration::ZERO)
    } else {
        OracleError::Transport(format!("{backend}: {err}"))
    }
}

/// Body text of a 2xx response; anything else becomes an error.
async fn checked_body(backend: &str, response: reqwest::Response) -> Result<String, OracleError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(OracleError::RateLimited {
            retry_after: BACKEND_RETRY_AFTER,
        });
    }
    let body = response
        .text()
        .await
        .map_err(|e| transport_failure(backend, &e))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(OracleError::Transport(format!("{backend} answered {status}: {body}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend(wire: BackendType, api_url: &str) -> HttpOracle {
        HttpOracle::new(&BackendConfig {
            backend_type: wire,
            api_url: api_url.to_owned(),
            api_key: "key".to_owned(),
            model: "village-model".to_owned(),
        })
    }

    #[test]
    fn chat_reply_yields_text_and_total_tokens() {
        let body = r#"{"choices":[{"message":{"content":"Good morning, Mara."}}],"usage":{"total_tokens":123}}"#;
        let generation = decode_generation(BackendType::OpenAi, body).ok();
        assert_eq!(
            generation,
            Some(Generation {
                text: "Good morning, Mara.".to_owned(),
                tokens_used: Some(123),
            })
        );
    }

    #[test]
    fn chat_reply_without_choices_is_malformed() {
        let reply = decode_generation(BackendType::OpenAi, r#"{"error":"rate_limit"}"#);
        assert!(matches!(reply, Err(OracleError::MalformedResponse(_))));
    }

    #[test]
    fn messages_reply_sums_input_and_output_tokens() {
        let body = r#"{"content":[{"type":"text","text":"SUMMARY: We talked."}],"usage":{"input_tokens":100,"output_tokens":20}}"#;
        let generation = decode_generation(BackendType::Anthropic, body).unwrap();
        assert_eq!(generation.text, "SUMMARY: We talked.");
        assert_eq!(generation.tokens_used, Some(120));
    }

    #[test]
    fn messages_reply_without_usage_still_decodes() {
        let body = r#"{"content":[{"type":"text","text":"Aye."}]}"#;
        let generation = decode_generation(BackendType::Anthropic, body).ok();
        assert_eq!(
            generation.map(|g| (g.text, g.tokens_used)),
            Some(("Aye.".to_owned(), None))
        );
    }

    #[test]
    fn empty_messages_reply_is_malformed() {
        assert!(decode_generation(BackendType::Anthropic, r#"{"content":[]}"#).is_err());
        assert!(decode_generation(BackendType::Anthropic, "not json").is_err());
    }

    #[test]
    fn endpoint_follows_wire_format() {
        let chat = backend(BackendType::OpenAi, "http://localhost:11434/v1/");
        assert_eq!(chat.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(chat.name(), "openai-compatible");

        let messages = backend(BackendType::Anthropic, "https://api.anthropic.com/v1");
        assert_eq!(messages.endpoint(), "https://api.anthropic.com/v1/messages");
        assert_eq!(messages.name(), "anthropic");
    }
}
