use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{ChatMessage, ChatTransport};
use super::AnalysisError;
use crate::config::AnalyzerConfig;

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenRouterTransport {
    base_url: String,
    api_key: String,
    referer: String,
    title: String,
    sampling: Sampling,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
    pub seed: u64,
    pub top_p: f32,
}

impl OpenRouterTransport {
    /// Build a transport from validated configuration.
    /// A missing API key is fatal here rather than on first request.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AnalysisError::MissingApiKey)?
            .to_string();

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            referer: config.referer.clone(),
            title: config.title.clone(),
            sampling: Sampling {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                seed: config.seed,
                top_p: config.top_p,
            },
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Request body for `/chat/completions`
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    seed: u64,
    top_p: f32,
}

/// Response body from `/chat/completions`
#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Map a non-success status to an error. 403 and 404 mean the provider
/// refuses this particular model, everything else is a plain failure.
pub fn status_error(model: &str, status: u16, body: String) -> AnalysisError {
    match status {
        403 | 404 => AnalysisError::ModelRejected {
            model: model.to_string(),
            status,
        },
        _ => AnalysisError::Http { status, body },
    }
}

impl ChatTransport for OpenRouterTransport {
    fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, AnalysisError> {
        let body = CompletionRequest {
            model,
            messages,
            temperature: self.sampling.temperature,
            max_tokens: self.sampling.max_tokens,
            seed: self.sampling.seed,
            top_p: self.sampling.top_p,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    AnalysisError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::debug!(model = %model, status = status.as_u16(), "Chat completion rejected");
            return Err(status_error(model, status.as_u16(), body));
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;

        extract_content(parsed)
    }
}

fn extract_content(parsed: CompletionResponse) -> Result<String, AnalysisError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AnalysisError::MalformedResponse("No content in first choice".into()))
}

/// Canned behavior for one model in [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Content(String),
    Status(u16),
    Timeout,
}

/// Scripted transport for tests: a reply per model, calls recorded in order.
pub struct MockTransport {
    replies: HashMap<String, MockReply>,
    default_reply: MockReply,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Every model answers with `content` unless scripted otherwise.
    pub fn new(content: &str) -> Self {
        Self {
            replies: HashMap::new(),
            default_reply: MockReply::Content(content.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every model fails with `status` unless scripted otherwise.
    pub fn failing(status: u16) -> Self {
        Self {
            replies: HashMap::new(),
            default_reply: MockReply::Status(status),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, model: &str, reply: MockReply) -> Self {
        self.replies.insert(model.to_string(), reply);
        self
    }

    /// Models requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ChatTransport for MockTransport {
    fn complete(&self, model: &str, _messages: &[ChatMessage]) -> Result<String, AnalysisError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(model.to_string());
        }
        match self.replies.get(model).unwrap_or(&self.default_reply) {
            MockReply::Content(text) => Ok(text.clone()),
            MockReply::Status(status) => Err(status_error(model, *status, String::new())),
            MockReply::Timeout => Err(AnalysisError::Timeout { secs: 120 }),
        }
    }
}
