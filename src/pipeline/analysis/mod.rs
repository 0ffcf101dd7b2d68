pub mod types;
pub mod sanitize;
pub mod prompt;
pub mod openrouter;
pub mod fallback;
pub mod parser;
pub mod heuristic;
pub mod coerce;
pub mod orchestrator;


pub use types::*;
pub use sanitize::*;
pub use prompt::*;
pub use openrouter::*;
pub use fallback::*;
pub use parser::*;
pub use heuristic::*;
pub use coerce::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("OpenRouter API key is not configured")]
    MissingApiKey,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model {model} was rejected by the provider (status {status})")]
    ModelRejected { model: String, status: u16 },

    #[error("Model list exhausted after {} attempts (tried: {}); last error: {last_error}", .tried.len(), .tried.join(", "))]
    ModelsExhausted {
        tried: Vec<String>,
        last_error: Box<AnalysisError>,
    },

    #[error("Chat completion returned error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Malformed chat completion response: {0}")]
    MalformedResponse(String),

    #[error("Input text too short for analysis (< {0} characters)")]
    InputTooShort(usize),

    #[error("Chat message is empty")]
    EmptyMessage,
}

impl AnalysisError {
    /// Status codes that mean "this provider will not serve this model".
    pub fn is_model_rejection(&self) -> bool {
        matches!(self, Self::ModelRejected { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_message_names_every_model() {
        let err = AnalysisError::ModelsExhausted {
            tried: vec!["a/one".into(), "b/two".into()],
            last_error: Box::new(AnalysisError::ModelRejected {
                model: "b/two".into(),
                status: 403,
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("exhausted after 2 attempts"));
        assert!(msg.contains("a/one, b/two"));
        assert!(msg.contains("status 403"));
    }

    #[test]
    fn only_rejections_count_as_model_rejection() {
        assert!(AnalysisError::ModelRejected { model: "m".into(), status: 404 }.is_model_rejection());
        assert!(!AnalysisError::Http { status: 500, body: String::new() }.is_model_rejection());
        assert!(!AnalysisError::Timeout { secs: 120 }.is_model_rejection());
        assert!(AnalysisError::Timeout { secs: 120 }.is_timeout());
    }
}
