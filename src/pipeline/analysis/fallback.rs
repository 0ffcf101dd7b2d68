//! Model fallback cascade.
//!
//! Walks an ordered model list and moves to the next model only when the
//! provider refuses the current one (HTTP 403/404). Any other failure is
//! returned as-is. The position in the list is carried by [`ModelCursor`],
//! which callers thread from one request into the next instead of sharing
//! a mutable global.

use serde::{Deserialize, Serialize};

use super::types::{ChatMessage, ChatTransport};
use super::AnalysisError;

/// Position in the model list where a request chain starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCursor(usize);

impl ModelCursor {
    pub const START: Self = Self(0);

    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// A successful reply and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    /// Index of `model`. Pass it back as the next request's start.
    pub cursor: ModelCursor,
}

enum FallbackState {
    Trying(usize),
    Succeeded(Completion),
    Exhausted(AnalysisError),
}

pub struct ModelFallbackClient<T> {
    transport: T,
    models: Vec<String>,
    fallback_on_timeout: bool,
}

impl<T: ChatTransport> ModelFallbackClient<T> {
    /// Duplicate model ids are dropped so no model is asked twice per chain.
    pub fn new(transport: T, models: Vec<String>) -> Result<Self, AnalysisError> {
        let mut unique: Vec<String> = Vec::with_capacity(models.len());
        for model in models {
            let model = model.trim().to_string();
            if !model.is_empty() && !unique.contains(&model) {
                unique.push(model);
            }
        }

        if unique.is_empty() {
            return Err(AnalysisError::Config("model list is empty".into()));
        }

        Ok(Self {
            transport,
            models: unique,
            fallback_on_timeout: false,
        })
    }

    /// Also advance on timeouts. Off by default: a slow model normally fails the request.
    pub fn with_timeout_fallback(mut self, enabled: bool) -> Self {
        self.fallback_on_timeout = enabled;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start index after clamping `cursor` into the list.
    pub fn resolve_start(&self, cursor: ModelCursor) -> usize {
        cursor.index().min(self.models.len() - 1)
    }

    /// Run the cascade from `start`. Each model is attempted at most once
    /// and the index only moves forward.
    pub fn complete(
        &self,
        messages: &[ChatMessage],
        start: ModelCursor,
    ) -> Result<Completion, AnalysisError> {
        let mut tried: Vec<String> = Vec::new();
        let mut state = FallbackState::Trying(self.resolve_start(start));

        loop {
            state = match state {
                FallbackState::Trying(index) => self.attempt(index, messages, &mut tried)?,
                FallbackState::Succeeded(completion) => return Ok(completion),
                FallbackState::Exhausted(last_error) => {
                    tracing::error!(
                        attempts = tried.len(),
                        "Every remaining model was rejected"
                    );
                    return Err(AnalysisError::ModelsExhausted {
                        tried,
                        last_error: Box::new(last_error),
                    });
                }
            };
        }
    }

    fn attempt(
        &self,
        index: usize,
        messages: &[ChatMessage],
        tried: &mut Vec<String>,
    ) -> Result<FallbackState, AnalysisError> {
        let model = &self.models[index];
        tried.push(model.clone());
        tracing::debug!(model = %model, attempt = tried.len(), "Requesting chat completion");

        match self.transport.complete(model, messages) {
            Ok(content) => Ok(FallbackState::Succeeded(Completion {
                content,
                model: model.clone(),
                cursor: ModelCursor(index),
            })),
            Err(e) if self.should_advance(&e) => {
                if index + 1 < self.models.len() {
                    tracing::warn!(
                        model = %model,
                        next_model = %self.models[index + 1],
                        error = %e,
                        "Model unavailable, falling back"
                    );
                    Ok(FallbackState::Trying(index + 1))
                } else {
                    Ok(FallbackState::Exhausted(e))
                }
            }
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "Chat completion failed without fallback");
                Err(e)
            }
        }
    }

    fn should_advance(&self, error: &AnalysisError) -> bool {
        error.is_model_rejection() || (self.fallback_on_timeout && error.is_timeout())
    }
}
