use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fallback::ModelCursor;
use super::AnalysisError;

/// One report analysis call. Built per upload, never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub report_text: String,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
}

impl AnalysisRequest {
    pub fn new(report_text: impl Into<String>) -> Self {
        Self {
            report_text: report_text.into(),
            user_profile: None,
        }
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.user_profile = Some(profile);
        self
    }
}

/// Personal context folded into prompts. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub dietary_preference: Option<String>,
    pub conditions: Vec<String>,
    pub allergies: Vec<String>,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Normalized analysis handed to the persistence layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub health_score: u8,
    pub metrics: BTreeMap<String, MetricReading>,
    pub deficiencies: Vec<Deficiency>,
    pub supplements: Vec<Supplement>,
    pub diet_plan: DietPlan,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricReading {
    pub value: MetricValue,
    pub unit: String,
    pub status: String,
    pub normal_range: String,
}

/// Lab values arrive either as numbers or as free text ("<5", "positive").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deficiency {
    pub name: String,
    pub severity: String,
    pub current_value: String,
    pub normal_range: String,
    pub symptoms: Vec<String>,
}

impl Deficiency {
    /// Shape used when the model only gave us a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            severity: "moderate".into(),
            current_value: "N/A".into(),
            normal_range: "N/A".into(),
            symptoms: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplement {
    pub name: String,
    pub dosage: String,
    pub reason: String,
    pub duration: String,
}

impl Supplement {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dosage: "As directed".into(),
            reason: String::new(),
            duration: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietPlan {
    pub breakfast: Vec<String>,
    pub lunch: Vec<String>,
    pub dinner: Vec<String>,
    pub snacks: Vec<String>,
    pub avoid: Vec<String>,
    pub general: Vec<String>,
}

/// Where the final result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisSource {
    /// The model answered with usable JSON.
    Model { model: String },
    /// The model answered, but its reply had to be replaced by local extraction.
    Heuristic { model: String, reason: String },
}

/// Everything the caller needs after one pass through the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub request_id: Uuid,
    pub result: AnalysisResult,
    pub source: AnalysisSource,
    /// Where the next request should start in the model list.
    pub cursor: ModelCursor,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// A single chat-completion backend (allows mocking).
pub trait ChatTransport {
    /// Send `messages` to `model` and return the raw reply text.
    fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, AnalysisError>;
}

impl<T: ChatTransport + ?Sized> ChatTransport for Box<T> {
    fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, AnalysisError> {
        (**self).complete(model, messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serializes_camel_case() {
        let result = AnalysisResult {
            health_score: 80,
            deficiencies: vec![Deficiency::named("Iron")],
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["healthScore"], 80);
        assert_eq!(json["deficiencies"][0]["currentValue"], "N/A");
        assert!(json["dietPlan"]["breakfast"].is_array());
    }

    #[test]
    fn metric_value_accepts_number_or_text() {
        let n: MetricValue = serde_json::from_str("9.5").unwrap();
        assert_eq!(n, MetricValue::Number(9.5));
        let t: MetricValue = serde_json::from_str("\"<5\"").unwrap();
        assert_eq!(t.to_string(), "<5");
    }

    #[test]
    fn profile_deserializes_with_missing_fields() {
        let profile: UserProfile = serde_json::from_str(r#"{"age": 41, "weightKg": 70.5}"#).unwrap();
        assert_eq!(profile.age, Some(41));
        assert_eq!(profile.weight_kg, Some(70.5));
        assert!(profile.conditions.is_empty());
        assert!(!profile.is_empty());
        assert!(UserProfile::default().is_empty());
    }

    #[test]
    fn chat_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn analysis_source_is_tagged() {
        let json = serde_json::to_value(AnalysisSource::Heuristic {
            model: "m".into(),
            reason: "no JSON".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "heuristic");
        assert_eq!(json["reason"], "no JSON");
    }
}
