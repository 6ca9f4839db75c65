//! Remote chat-completion client.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint (Groq by
//! default). Each call sends the fixed system policy plus one user prompt
//! and returns the first choice's text. There are no retries; every
//! failure is reported as a [`CompletionFailure`] so the caller can fall
//! back to an apology.

use std::time::Duration;

use async_trait::async_trait;
use medchat_core::config::CompletionConfig;
use medchat_core::error::MedchatError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Persona, formatting and safety rules sent as the system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a knowledgeable and empathetic medical assistant AI designed to provide helpful information. \
Always tailor your response to the user's specific condition or symptoms, using the provided conversation history to maintain context. \
Do NOT provide definitive diagnoses, harmful advice, or speculative answers. For unclear inputs, ask clarifying questions or admit uncertainty. \
Use plain, layperson-friendly language, explaining medical terms if needed.\n\n\
Your output MUST:\n\
- Start with a brief empathetic acknowledgement (e.g., 'I'm sorry you're feeling this way'), but only at the start of a diagnosis. If it is a follow-up, do not repeat it, and read the situation rather than always apologizing.\n\
- List potential causes related only to the user's input, avoiding unrelated conditions.\n\
- Use <ul> and <li> tags for bullet lists.\n\
- Use <strong> to highlight symptom names, conditions, or key terms.\n\
- Provide actionable, safe, and relevant suggestions, avoiding repetition unless applicable.\n\
- For urgent symptoms (e.g., chest pain, difficulty breathing), urge the user to seek immediate medical attention.\n\
- Include a disclaimer: 'This information is for general guidance only. Always consult a healthcare professional for personalized advice, diagnosis, or treatment.'\n\
- Do NOT include markdown, code formatting, or technical jargon unless explained.\n\
- Do NOT provide vague or identical responses for different symptoms.\n";

/// Why a completion produced no usable text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionFailure {
    #[error("completion endpoint rejected the API key")]
    Unauthorized,
    #[error("completion endpoint rate limit exceeded")]
    RateLimited,
    #[error("completion endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("completion request timed out")]
    Timeout,
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
    #[error("completion response was empty")]
    EmptyResponse,
}

impl CompletionFailure {
    /// Short machine-readable label.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::HttpStatus { .. } => "http_status",
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
            Self::MalformedResponse(_) => "malformed_response",
            Self::EmptyResponse => "empty_response",
        }
    }
}

/// Anything that can turn a prompt into assistant text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionFailure>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for the completion endpoint.
pub struct CompletionClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

impl CompletionClient {
    /// Build a client from configuration. The request timeout is always set.
    pub fn new(config: &CompletionConfig) -> Result<Self, MedchatError> {
        let url = reqwest::Url::parse(&config.api_url).map_err(|e| {
            MedchatError::Config(format!("Invalid completion URL '{}': {}", config.api_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MedchatError::Config(format!(
                "Completion URL must use http or https, got: {}",
                url.scheme()
            )));
        }
        if config.timeout_secs == 0 {
            return Err(MedchatError::Config(
                "completion.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if config.api_key.is_empty() {
            warn!("No completion API key configured; remote calls will be rejected");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedchatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(url = %config.api_url, model = %config.model, "Completion client created");

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }

    fn classify_transport_error(err: reqwest::Error) -> CompletionFailure {
        if err.is_timeout() {
            error!(error = %err, "Completion request timed out");
            CompletionFailure::Timeout
        } else if err.is_decode() {
            error!(error = %err, "Failed to decode completion response");
            CompletionFailure::MalformedResponse(err.to_string())
        } else {
            error!(error = %err, "Completion request failed");
            CompletionFailure::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionFailure> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Sending completion request");

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(match status {
                StatusCode::UNAUTHORIZED => {
                    error!(status = status.as_u16(), body = %body, "Completion API key rejected");
                    CompletionFailure::Unauthorized
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!(status = status.as_u16(), "Completion rate limit exceeded");
                    CompletionFailure::RateLimited
                }
                _ => {
                    error!(status = status.as_u16(), body = %body, "Completion endpoint error");
                    CompletionFailure::HttpStatus {
                        status: status.as_u16(),
                        body,
                    }
                }
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(Self::classify_transport_error)?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            error!("Completion response contained no choices");
            return Err(CompletionFailure::MalformedResponse(
                "no choices in response".to_string(),
            ));
        };

        let content = choice.message.content.unwrap_or_default();
        let content = content.trim();
        if content.is_empty() {
            warn!("Completion endpoint returned empty content");
            return Err(CompletionFailure::EmptyResponse);
        }

        Ok(content.to_string())
    }
}

/// Body of a non-success response, kept for logs and `HttpStatus`.
async fn error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to read completion error body");
            format!("<unreadable body: {}>", e)
        }
    }
}
