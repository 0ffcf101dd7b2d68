use std::fmt::Write as _;

use super::types::{ChatMessage, UserProfile};

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a clinical nutrition assistant that reads laboratory reports and explains them for a general wellness audience. You are NOT a doctor and you do not diagnose.

RULES:
1. Use ONLY values that appear in the report. Never invent measurements.
2. Classify each metric as "low", "normal" or "high" against the reference range printed in the report, or a standard adult range when none is printed.
3. A deficiency is any metric outside its range that nutrition or supplementation can address.
4. healthScore is an INTEGER from 0 to 100.
5. Every list field MUST be a JSON array, even when it has one entry or none.
6. Respond with a single JSON object and nothing else. No Markdown, no commentary.

JSON SCHEMA:
{
  "summary": "2-3 sentence plain-language overview",
  "healthScore": 0,
  "metrics": {
    "<metric name>": {"value": 0.0, "unit": "unit", "status": "low | normal | high", "normalRange": "low-high unit"}
  },
  "deficiencies": [
    {"name": "name", "severity": "mild | moderate | severe", "currentValue": "value unit", "normalRange": "low-high unit", "symptoms": ["symptom"]}
  ],
  "supplements": [
    {"name": "name", "dosage": "amount and frequency", "reason": "why", "duration": "how long"}
  ],
  "dietPlan": {
    "breakfast": ["item"], "lunch": ["item"], "dinner": ["item"], "snacks": ["item"], "avoid": ["item"], "general": ["guidance"]
  },
  "recommendations": ["recommendation"]
}"#;

/// Build the system/user message pair for one report.
pub fn build_analysis_messages(report_text: &str, profile: Option<&UserProfile>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user(build_analysis_prompt(report_text, profile)),
    ]
}

/// User message: profile block followed by the report inside `<report>` tags.
pub fn build_analysis_prompt(report_text: &str, profile: Option<&UserProfile>) -> String {
    let profile_block = match profile.filter(|p| !p.is_empty()) {
        Some(p) => format_profile(p),
        None => "No personal profile was provided. Use standard adult reference ranges.\n".to_string(),
    };

    format!(
        r#"PATIENT PROFILE:
{profile_block}
<report>
{report_text}
</report>

Analyze the report above and return the JSON object described in your instructions. Tailor the diet plan to the profile's dietary preference and avoid listed allergens."#
    )
}

/// Render the non-empty profile fields as a bullet list.
pub fn format_profile(profile: &UserProfile) -> String {
    let mut out = String::new();

    if let Some(name) = &profile.name {
        let _ = writeln!(out, "- Name: {name}");
    }
    if let Some(age) = profile.age {
        let _ = writeln!(out, "- Age: {age}");
    }
    if let Some(gender) = &profile.gender {
        let _ = writeln!(out, "- Gender: {gender}");
    }
    if let Some(weight) = profile.weight_kg {
        let _ = writeln!(out, "- Weight: {weight} kg");
    }
    if let Some(height) = profile.height_cm {
        let _ = writeln!(out, "- Height: {height} cm");
    }
    if let (Some(w), Some(h)) = (profile.weight_kg, profile.height_cm) {
        if h > 0.0 {
            let bmi = w / ((h / 100.0) * (h / 100.0));
            let _ = writeln!(out, "- BMI: {bmi:.1}");
        }
    }
    if let Some(diet) = &profile.dietary_preference {
        let _ = writeln!(out, "- Dietary preference: {diet}");
    }
    if !profile.conditions.is_empty() {
        let _ = writeln!(out, "- Known conditions: {}", profile.conditions.join(", "));
    }
    if !profile.allergies.is_empty() {
        let _ = writeln!(out, "- Allergies: {}", profile.allergies.join(", "));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::types::ChatRole;

    fn sample_profile() -> UserProfile {
        UserProfile {
            age: Some(34),
            gender: Some("female".into()),
            weight_kg: Some(64.0),
            height_cm: Some(160.0),
            dietary_preference: Some("vegetarian".into()),
            allergies: vec!["peanuts".into()],
            ..Default::default()
        }
    }

    #[test]
    fn builds_system_then_user() {
        let messages = build_analysis_messages("Hemoglobin: 11.2 g/dL", None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].role, ChatRole::User);
        assert!(messages[1].content.contains("<report>\nHemoglobin: 11.2 g/dL\n</report>"));
    }

    #[test]
    fn missing_profile_is_stated() {
        let prompt = build_analysis_prompt("text", None);
        assert!(prompt.contains("No personal profile was provided"));
    }

    #[test]
    fn empty_profile_treated_as_missing() {
        let prompt = build_analysis_prompt("text", Some(&UserProfile::default()));
        assert!(prompt.contains("No personal profile was provided"));
    }

    #[test]
    fn profile_fields_rendered() {
        let prompt = build_analysis_prompt("text", Some(&sample_profile()));
        assert!(prompt.contains("- Age: 34"));
        assert!(prompt.contains("- Dietary preference: vegetarian"));
        assert!(prompt.contains("- Allergies: peanuts"));
        assert!(prompt.contains("- BMI: 25.0"));
        assert!(!prompt.contains("Known conditions"));
    }

    #[test]
    fn system_prompt_demands_arrays_and_json_only() {
        assert!(ANALYSIS_SYSTEM_PROMPT.contains("MUST be a JSON array"));
        assert!(ANALYSIS_SYSTEM_PROMPT.contains("single JSON object"));
        assert!(ANALYSIS_SYSTEM_PROMPT.contains("\"healthScore\""));
    }
}
