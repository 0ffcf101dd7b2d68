//! AI chat assistant.
//!
//! Shares the model cascade with report analysis, so a chat turn follows the
//! same fallback rules and returns the same cursor for the next turn.
//! Adds title generation and prompt suggestions for the conversation list.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;
use crate::pipeline::analysis::{
    format_profile, sanitize_report_text, AnalysisError, AnalysisResult, ChatMessage, ChatRole,
    ChatTransport, ModelCursor, ModelFallbackClient, OpenRouterTransport, UserProfile,
};

/// History turns forwarded to the model.
const MAX_HISTORY_TURNS: usize = 6;

/// Title length before truncation (characters).
const TITLE_MAX_CHARS: usize = 50;

pub const CHAT_SYSTEM_PROMPT: &str = r#"You are VitalScan, a friendly health and nutrition assistant. You are NOT a doctor.

RULES:
1. Give general wellness, nutrition and lifestyle information only.
2. NEVER diagnose, and never tell the user to start, stop or change a prescribed medication.
3. When the user's latest report analysis is provided, refer to it by name ("your latest report shows...").
4. Suggest seeing a healthcare professional whenever symptoms sound serious or persistent.
5. Keep answers short: a few sentences or a brief list."#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<ChatMessage>,
    pub user_profile: Option<UserProfile>,
    pub latest_analysis: Option<AnalysisResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    pub cursor: ModelCursor,
}

/// Conversation starter shown in an empty chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSuggestion {
    pub text: String,
    pub category: String,
}

pub struct ChatAssistant<T> {
    client: ModelFallbackClient<T>,
}

impl ChatAssistant<OpenRouterTransport> {
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalysisError> {
        let transport = OpenRouterTransport::from_config(config)?;
        let client = ModelFallbackClient::new(transport, config.models.clone())?
            .with_timeout_fallback(config.fallback_on_timeout);
        Ok(Self::new(client))
    }
}

impl<T: ChatTransport> ChatAssistant<T> {
    pub fn new(client: ModelFallbackClient<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ModelFallbackClient<T> {
        &self.client
    }

    /// Answer one user turn.
    pub fn reply(&self, request: &ChatRequest, start: ModelCursor) -> Result<ChatReply, AnalysisError> {
        let message = sanitize_report_text(&request.message);
        if message.is_empty() {
            return Err(AnalysisError::EmptyMessage);
        }

        let messages = build_chat_messages(request);
        tracing::info!(
            history_turns = messages.len().saturating_sub(2),
            has_analysis = request.latest_analysis.is_some(),
            "Chat turn"
        );

        let completion = self.client.complete(&messages, start)?;
        let content = completion.content.trim().to_string();
        if content.is_empty() {
            return Err(AnalysisError::MalformedResponse("empty chat reply".into()));
        }

        Ok(ChatReply {
            content,
            model: completion.model,
            cursor: completion.cursor,
        })
    }
}

/// System context, trimmed history, then the new user message.
pub fn build_chat_messages(request: &ChatRequest) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(build_chat_context(request))];

    let history: Vec<&ChatMessage> = request
        .history
        .iter()
        .filter(|m| m.role != ChatRole::System && !m.content.trim().is_empty())
        .collect();
    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
    messages.extend(history.into_iter().skip(skip).cloned());

    messages.push(ChatMessage::user(sanitize_report_text(&request.message)));
    messages
}

fn build_chat_context(request: &ChatRequest) -> String {
    let mut context = CHAT_SYSTEM_PROMPT.to_string();

    if let Some(profile) = request.user_profile.as_ref().filter(|p| !p.is_empty()) {
        context.push_str("\n\nUSER PROFILE:\n");
        context.push_str(&format_profile(profile));
    }

    if let Some(analysis) = &request.latest_analysis {
        context.push_str("\n\nLATEST REPORT ANALYSIS:\n");
        let _ = writeln!(context, "- Health score: {}/100", analysis.health_score);
        if !analysis.summary.is_empty() {
            let _ = writeln!(context, "- Summary: {}", analysis.summary);
        }
        if !analysis.deficiencies.is_empty() {
            let names: Vec<String> = analysis
                .deficiencies
                .iter()
                .map(|d| format!("{} ({}, {})", d.name, d.severity, d.current_value))
                .collect();
            let _ = writeln!(context, "- Deficiencies: {}", names.join("; "));
        }
    }

    context
}

/// Conversation title from the first user message.
/// Truncates at 50 characters with "..." if longer, handling UTF-8 correctly.
pub fn generate_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return "New conversation".to_string();
    }

    match trimmed.char_indices().nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Starter prompts; the report-specific ones only appear once an analysis exists.
pub fn prompt_suggestions(has_analysis: bool) -> Vec<PromptSuggestion> {
    let mut suggestions = vec![
        PromptSuggestion {
            text: "What should a balanced breakfast look like?".into(),
            category: "diet".into(),
        },
        PromptSuggestion {
            text: "How much water should I drink each day?".into(),
            category: "lifestyle".into(),
        },
        PromptSuggestion {
            text: "Which foods are good sources of iron?".into(),
            category: "diet".into(),
        },
    ];

    if has_analysis {
        suggestions.insert(
            0,
            PromptSuggestion {
                text: "Explain my latest report in simple terms".into(),
                category: "report".into(),
            },
        );
        suggestions.insert(
            1,
            PromptSuggestion {
                text: "What should I eat to improve my deficiencies?".into(),
                category: "report".into(),
            },
        );
    }

    suggestions
}
