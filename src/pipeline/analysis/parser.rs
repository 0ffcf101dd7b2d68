use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Greedy span from the first `{` to the last `}`.
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Opening or closing Markdown code fence, with optional language tag.
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*```[A-Za-z0-9_-]*\s*$").unwrap());

/// Outcome of reading a model reply. Unparseable replies are a normal
/// outcome that routes the request to the heuristic extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Structured(Value),
    Unparseable { reason: String },
}

impl ParsedReply {
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

/// Parse the first JSON object out of a free-text model reply.
pub fn parse_model_reply(raw: &str) -> ParsedReply {
    let unfenced = strip_code_fences(raw);

    let Some(span) = JSON_OBJECT.find(&unfenced) else {
        return ParsedReply::Unparseable {
            reason: "no JSON object in reply".into(),
        };
    };

    match serde_json::from_str::<Map<String, Value>>(span.as_str()) {
        Ok(object) => ParsedReply::Structured(Value::Object(object)),
        Err(e) => ParsedReply::Unparseable {
            reason: format!("invalid JSON: {e}"),
        },
    }
}

/// Drop fence lines (```json, ```) and keep everything between them.
fn strip_code_fences(raw: &str) -> String {
    CODE_FENCE.replace_all(raw.trim(), "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_object() {
        let parsed = parse_model_reply(r#"{"summary": "ok", "healthScore": 88}"#);
        assert_eq!(parsed, ParsedReply::Structured(json!({"summary": "ok", "healthScore": 88})));
    }

    #[test]
    fn parses_fenced_object() {
        let reply = "```json\n{\"summary\": \"fenced\"}\n```";
        assert_eq!(parse_model_reply(reply), ParsedReply::Structured(json!({"summary": "fenced"})));
    }

    #[test]
    fn parses_fence_without_language_tag() {
        let reply = "```\n{\"healthScore\": 70}\n```";
        assert!(parse_model_reply(reply).is_structured());
    }

    #[test]
    fn parses_object_with_preamble_and_trailer() {
        let reply = "Here is your analysis:\n\n{\"summary\": \"x\", \"metrics\": {\"a\": {\"value\": 1}}}\n\nStay healthy!";
        match parse_model_reply(reply) {
            ParsedReply::Structured(v) => assert_eq!(v["metrics"]["a"]["value"], 1),
            other => panic!("expected structured, got {other:?}"),
        }
    }

    #[test]
    fn keeps_braces_inside_strings() {
        let reply = r#"{"summary": "range {12-16}", "recommendations": ["a"]}"#;
        match parse_model_reply(reply) {
            ParsedReply::Structured(v) => assert_eq!(v["summary"], "range {12-16}"),
            other => panic!("expected structured, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_is_unparseable() {
        let parsed = parse_model_reply("Your hemoglobin looks a little low.");
        assert!(matches!(parsed, ParsedReply::Unparseable { ref reason } if reason.contains("no JSON")));
    }

    #[test]
    fn broken_json_is_unparseable() {
        let parsed = parse_model_reply("{\"summary\": \"cut off\", \"healthScore\": ");
        assert!(!parsed.is_structured());
    }

    #[test]
    fn two_objects_are_unparseable() {
        // Greedy span covers both objects, which is not valid JSON
        let parsed = parse_model_reply(r#"{"a": 1} and also {"b": 2}"#);
        assert!(matches!(parsed, ParsedReply::Unparseable { ref reason } if reason.starts_with("invalid JSON")));
    }

    #[test]
    fn array_reply_yields_inner_object() {
        let parsed = parse_model_reply(r#"[{"a": 1}]"#);
        assert_eq!(parsed, ParsedReply::Structured(json!({"a": 1})));

        let parsed = parse_model_reply("```json\n[]\n```");
        assert!(!parsed.is_structured());
    }
}
