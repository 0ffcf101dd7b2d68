// Shape coercion for model output (and heuristic output, which takes the same path).
// The model is asked for a schema but nothing guarantees it: lists come back as
// bare strings, scores as words, metrics as arrays. Everything is normalized here,
// nothing is rejected. Already well-formed input passes through unchanged.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::types::{AnalysisResult, Deficiency, DietPlan, MetricReading, MetricValue, Supplement};

/// Score used when nothing usable was supplied.
pub const DEFAULT_HEALTH_SCORE: u8 = 75;

const DEFAULT_SUMMARY: &str = "Analysis completed. Review the details below.";

/// Word scores, checked in order.
const SCORE_WORDS: &[(&str, u8)] = &[("excellent", 95), ("good", 85), ("fair", 75), ("poor", 60)];

/// Whole-string numeric score: "82", "82%", "82/100".
static NUMERIC_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*(?:%|/\s*100)?\s*$").unwrap());

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());

/// Normalized result plus a note for every field that had to be repaired.
#[derive(Debug, Clone)]
pub struct CoercionReport {
    pub result: AnalysisResult,
    pub repairs: Vec<String>,
}

/// Normalize any JSON value into an [`AnalysisResult`].
pub fn coerce_analysis(value: Value) -> AnalysisResult {
    coerce_analysis_with_report(value).result
}

pub fn coerce_analysis_with_report(value: Value) -> CoercionReport {
    let mut repairs = Vec::new();

    let mut obj = match value {
        Value::Object(map) => map,
        Value::String(text) => {
            repairs.push("top-level string used as summary".to_string());
            let mut map = Map::new();
            map.insert("summary".into(), Value::String(text));
            map
        }
        other => {
            repairs.push(format!("top-level {} replaced by empty analysis", kind(&other)));
            Map::new()
        }
    };

    let summary = coerce_summary(take(&mut obj, &["summary", "overview"]), &mut repairs);
    let health_score = coerce_health_score(
        take(&mut obj, &["healthScore", "health_score", "score"]),
        &mut repairs,
    );
    let metrics = coerce_metrics(take(&mut obj, &["metrics", "labValues", "lab_values"]), &mut repairs);
    let deficiencies = coerce_list(
        "deficiencies",
        take(&mut obj, &["deficiencies"]),
        coerce_deficiency,
        &mut repairs,
    );
    let supplements = coerce_list(
        "supplements",
        take(&mut obj, &["supplements"]),
        coerce_supplement,
        &mut repairs,
    );
    let diet_plan = coerce_diet_plan(take(&mut obj, &["dietPlan", "diet_plan"]), &mut repairs);
    let recommendations = coerce_list(
        "recommendations",
        take(&mut obj, &["recommendations"]),
        coerce_text,
        &mut repairs,
    );

    CoercionReport {
        result: AnalysisResult {
            summary,
            health_score,
            metrics,
            deficiencies,
            supplements,
            diet_plan,
            recommendations,
        },
        repairs,
    }
}

/// Map any score-like value into 0..=100.
pub fn coerce_health_score(value: Option<Value>, repairs: &mut Vec<String>) -> u8 {
    match value {
        Some(Value::Number(n)) => match n.as_f64().filter(|f| f.is_finite()) {
            Some(f) => {
                let score = clamp_score(f);
                if f != f64::from(score) {
                    repairs.push(format!("healthScore {f} rounded/clamped to {score}"));
                }
                score
            }
            None => {
                repairs.push("healthScore not finite".into());
                DEFAULT_HEALTH_SCORE
            }
        },
        Some(Value::String(text)) => {
            let score = score_from_text(&text);
            repairs.push(format!("healthScore string '{text}' mapped to {score}"));
            score
        }
        Some(other) => {
            repairs.push(format!("healthScore {} replaced by default", kind(&other)));
            DEFAULT_HEALTH_SCORE
        }
        None => {
            repairs.push("healthScore missing".into());
            DEFAULT_HEALTH_SCORE
        }
    }
}

/// A purely numeric string ("82", "82/100", "82%") is read as a number.
/// Otherwise the word table wins over any number embedded in prose, so
/// "Fair, 2 deficiencies found" is 75, not 2.
pub fn score_from_text(text: &str) -> u8 {
    if let Some(n) = NUMERIC_SCORE
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
    {
        return clamp_score(n);
    }

    let lower = text.trim().to_lowercase();
    if let Some((_, score)) = SCORE_WORDS.iter().find(|(word, _)| lower.contains(word)) {
        return *score;
    }

    FIRST_NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(clamp_score)
        .unwrap_or(DEFAULT_HEALTH_SCORE)
}

fn clamp_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

fn coerce_summary(value: Option<Value>, repairs: &mut Vec<String>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(v @ (Value::Number(_) | Value::Bool(_))) => {
            repairs.push("summary was not a string".into());
            v.to_string()
        }
        Some(Value::Array(items)) => {
            repairs.push("summary array joined".into());
            let parts: Vec<String> = items
                .into_iter()
                .filter_map(coerce_text)
                .filter(|part| !part.trim().is_empty())
                .collect();
            if parts.is_empty() {
                DEFAULT_SUMMARY.to_string()
            } else {
                parts.join(" ")
            }
        }
        _ => {
            repairs.push("summary missing".into());
            DEFAULT_SUMMARY.to_string()
        }
    }
}

/// Any list-typed field: array kept, single value wrapped, null/missing emptied.
/// Items already in the right shape are kept as-is, empty strings included.
fn coerce_list<T>(
    field: &str,
    value: Option<Value>,
    item: fn(Value) -> Option<T>,
    repairs: &mut Vec<String>,
) -> Vec<T> {
    match value {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            let total = items.len();
            let kept: Vec<T> = items.into_iter().filter_map(item).collect();
            if kept.len() != total {
                repairs.push(format!("{field}: dropped {} unusable item(s)", total - kept.len()));
            }
            kept
        }
        Some(Value::String(text)) if text.trim().is_empty() => {
            repairs.push(format!("{field}: blank string replaced by empty array"));
            Vec::new()
        }
        Some(single) => {
            repairs.push(format!("{field}: bare {} wrapped into array", kind(&single)));
            item(single).into_iter().collect()
        }
    }
}

fn coerce_text(value: Value) -> Option<String> {
    match value {
        Value::Object(mut map) => {
            take(&mut map, &["text", "recommendation", "description", "title", "name"])
                .and_then(coerce_text)
                .filter(|text| !text.trim().is_empty())
        }
        other => text_of(&other),
    }
}

fn coerce_deficiency(value: Value) -> Option<Deficiency> {
    match value {
        Value::Object(mut map) => {
            let name = name_field(&mut map, &["name", "deficiency", "nutrient", "title"])?;
            let mut repairs = Vec::new();
            let symptoms = coerce_list(
                "symptoms",
                take(&mut map, &["symptoms"]),
                coerce_text,
                &mut repairs,
            );
            Some(Deficiency {
                name,
                severity: text_field(&mut map, &["severity", "level"])
                    .unwrap_or_else(|| "moderate".into()),
                current_value: text_field(&mut map, &["currentValue", "current_value", "value"])
                    .unwrap_or_else(|| "N/A".into()),
                normal_range: text_field(
                    &mut map,
                    &["normalRange", "normal_range", "range", "referenceRange"],
                )
                .unwrap_or_else(|| "N/A".into()),
                symptoms,
            })
        }
        Value::Array(_) => None,
        other => text_of(&other).filter(|s| !s.trim().is_empty()).map(Deficiency::named),
    }
}

fn coerce_supplement(value: Value) -> Option<Supplement> {
    match value {
        Value::Object(mut map) => {
            let name = name_field(&mut map, &["name", "supplement", "title"])?;
            Some(Supplement {
                name,
                dosage: text_field(&mut map, &["dosage", "dose"])
                    .unwrap_or_else(|| "As directed".into()),
                reason: text_field(&mut map, &["reason", "purpose", "benefit"]).unwrap_or_default(),
                duration: text_field(&mut map, &["duration"]).unwrap_or_default(),
            })
        }
        Value::Array(_) => None,
        other => text_of(&other).filter(|s| !s.trim().is_empty()).map(Supplement::named),
    }
}

fn coerce_metrics(value: Option<Value>, repairs: &mut Vec<String>) -> BTreeMap<String, MetricReading> {
    let mut metrics = BTreeMap::new();

    match value {
        None => {}
        Some(Value::Object(map)) => {
            for (name, entry) in map {
                match coerce_metric(entry) {
                    Some(reading) => {
                        metrics.insert(name, reading);
                    }
                    None => repairs.push(format!("metric '{name}' dropped")),
                }
            }
        }
        Some(Value::Array(items)) => {
            repairs.push("metrics array converted to map".into());
            for item in items {
                let Value::Object(mut map) = item else {
                    continue;
                };
                let Some(name) = name_field(&mut map, &["name", "metric", "test"]) else {
                    continue;
                };
                if let Some(reading) = coerce_metric(Value::Object(map)) {
                    metrics.insert(name, reading);
                }
            }
        }
        Some(other) => repairs.push(format!("metrics {} discarded", kind(&other))),
    }

    metrics
}

fn coerce_metric(value: Value) -> Option<MetricReading> {
    match value {
        Value::Object(mut map) => {
            let value = match take(&mut map, &["value", "result", "currentValue"]) {
                Some(Value::Number(n)) => n
                    .as_f64()
                    .map(MetricValue::Number)
                    .unwrap_or_else(|| MetricValue::Text(n.to_string())),
                Some(other) => text_of(&other)
                    .map(MetricValue::Text)
                    .unwrap_or_else(|| MetricValue::Text("N/A".into())),
                None => MetricValue::Text("N/A".into()),
            };
            Some(MetricReading {
                value,
                unit: text_field(&mut map, &["unit", "units"]).unwrap_or_default(),
                status: text_field(&mut map, &["status", "flag"]).unwrap_or_else(|| "unknown".into()),
                normal_range: text_field(
                    &mut map,
                    &["normalRange", "normal_range", "range", "referenceRange"],
                )
                .unwrap_or_else(|| "N/A".into()),
            })
        }
        Value::Number(n) => n.as_f64().map(|f| bare_reading(MetricValue::Number(f))),
        Value::String(text) if !text.trim().is_empty() => Some(bare_reading(MetricValue::Text(text))),
        _ => None,
    }
}

fn bare_reading(value: MetricValue) -> MetricReading {
    MetricReading {
        value,
        unit: String::new(),
        status: "unknown".into(),
        normal_range: "N/A".into(),
    }
}

fn coerce_diet_plan(value: Option<Value>, repairs: &mut Vec<String>) -> DietPlan {
    match value {
        None | Some(Value::Null) => DietPlan::default(),
        Some(Value::Object(mut map)) => DietPlan {
            breakfast: coerce_list("dietPlan.breakfast", take(&mut map, &["breakfast"]), coerce_text, repairs),
            lunch: coerce_list("dietPlan.lunch", take(&mut map, &["lunch"]), coerce_text, repairs),
            dinner: coerce_list("dietPlan.dinner", take(&mut map, &["dinner"]), coerce_text, repairs),
            snacks: coerce_list("dietPlan.snacks", take(&mut map, &["snacks", "snack"]), coerce_text, repairs),
            avoid: coerce_list(
                "dietPlan.avoid",
                take(&mut map, &["avoid", "foodsToAvoid", "foods_to_avoid"]),
                coerce_text,
                repairs,
            ),
            general: coerce_list(
                "dietPlan.general",
                take(&mut map, &["general", "notes", "guidelines"]),
                coerce_text,
                repairs,
            ),
        },
        Some(other) => {
            repairs.push(format!("dietPlan {} moved to general", kind(&other)));
            DietPlan {
                general: coerce_list("dietPlan", Some(other), coerce_text, repairs),
                ..DietPlan::default()
            }
        }
    }
}

/// Remove and return the first non-null value among `keys`.
fn take(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|k| map.remove(*k))
        .find(|v| !v.is_null())
}

fn text_field(map: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    take(map, keys).as_ref().and_then(text_of)
}

/// Like [`text_field`], but a blank value counts as missing.
fn name_field(map: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    text_field(map, keys).filter(|s| !s.trim().is_empty())
}

/// Scalar to string, empty strings included. Containers yield nothing.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
