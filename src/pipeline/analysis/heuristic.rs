//! Local fallback when the model reply cannot be parsed.
//!
//! A short fixed table of lab metrics matched with regexes. This is a
//! safety net that keeps the request from failing, not a report parser.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

const BASE_SCORE: i64 = 95;
const DEFICIENCY_PENALTY: i64 = 8;
const MIN_SCORE: i64 = 51;
const MAX_SCORE: i64 = 100;

struct KnownMetric {
    key: &'static str,
    label: &'static str,
    regex: Regex,
    unit: &'static str,
    low: f64,
    high: f64,
    low_symptoms: &'static [&'static str],
    high_symptoms: &'static [&'static str],
    /// (name, dosage, reason, duration) suggested when the value is low.
    low_supplement: Option<(&'static str, &'static str, &'static str, &'static str)>,
}

impl KnownMetric {
    fn normal_range(&self) -> String {
        format!("{}-{} {}", self.low, self.high, self.unit)
    }

    fn status(&self, value: f64) -> Status {
        if value < self.low {
            Status::Low
        } else if value > self.high {
            Status::High
        } else {
            Status::Normal
        }
    }

    /// Relative distance outside the range.
    fn deviation(&self, value: f64) -> f64 {
        match self.status(value) {
            Status::Low => (self.low - value) / self.low,
            Status::High => (value - self.high) / self.high,
            Status::Normal => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Low,
    Normal,
    High,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

static KNOWN_METRICS: LazyLock<Vec<KnownMetric>> = LazyLock::new(|| {
    vec![
        KnownMetric {
            key: "hemoglobin",
            label: "Hemoglobin",
            regex: Regex::new(r"(?i)\b(?:hemoglobin|haemoglobin|hgb)\b(?:\s*\([^)]*\))?[:\s]+(\d+(?:\.\d+)?)").unwrap(),
            unit: "g/dL",
            low: 12.0,
            high: 16.0,
            low_symptoms: &["Fatigue", "Weakness", "Pale skin", "Shortness of breath"],
            high_symptoms: &["Headache", "Dizziness"],
            low_supplement: Some((
                "Iron (ferrous bisglycinate)",
                "25-30 mg elemental iron daily",
                "Supports hemoglobin production",
                "8-12 weeks, then retest",
            )),
        },
        KnownMetric {
            key: "glucose",
            label: "Glucose",
            regex: Regex::new(r"(?i)\b(?:fasting\s+)?(?:blood\s+)?glucose\b(?:\s*\([^)]*\))?[:\s]+(\d+(?:\.\d+)?)").unwrap(),
            unit: "mg/dL",
            low: 70.0,
            high: 100.0,
            low_symptoms: &["Shakiness", "Sweating", "Irritability"],
            high_symptoms: &["Increased thirst", "Frequent urination", "Fatigue"],
            low_supplement: None,
        },
        KnownMetric {
            key: "vitaminD",
            label: "Vitamin D",
            regex: Regex::new(r"(?i)\bvitamin\s*d3?\b(?:\s*\([^)]*\))?[:\s]+(\d+(?:\.\d+)?)").unwrap(),
            unit: "ng/mL",
            low: 30.0,
            high: 100.0,
            low_symptoms: &["Bone pain", "Muscle weakness", "Low mood"],
            high_symptoms: &["Nausea", "Weakness"],
            low_supplement: Some((
                "Vitamin D3",
                "1000-2000 IU daily with a meal",
                "Restores vitamin D levels",
                "12 weeks, then retest",
            )),
        },
        KnownMetric {
            key: "vitaminB12",
            label: "Vitamin B12",
            regex: Regex::new(r"(?i)\b(?:vitamin\s*)?b12\b(?:\s*\([^)]*\))?[:\s]+(\d+(?:\.\d+)?)").unwrap(),
            unit: "pg/mL",
            low: 200.0,
            high: 900.0,
            low_symptoms: &["Tingling in hands or feet", "Fatigue", "Memory problems"],
            high_symptoms: &[],
            low_supplement: Some((
                "Vitamin B12 (methylcobalamin)",
                "500-1000 mcg daily",
                "Restores B12 levels",
                "8 weeks, then retest",
            )),
        },
    ]
});

/// One metric found in the report text.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicFinding {
    pub key: &'static str,
    pub label: &'static str,
    pub value: f64,
    /// Number as written in the report, so "9.50" stays "9.50".
    pub raw_value: String,
    pub unit: &'static str,
    pub status: &'static str,
}

/// Scan the report for every known metric (first match per metric).
pub fn find_known_metrics(report_text: &str) -> Vec<HeuristicFinding> {
    KNOWN_METRICS
        .iter()
        .filter_map(|metric| {
            let caps = metric.regex.captures(report_text)?;
            let raw = caps.get(1)?.as_str();
            let value: f64 = raw.parse().ok()?;
            Some(HeuristicFinding {
                key: metric.key,
                label: metric.label,
                value,
                raw_value: raw.to_string(),
                unit: metric.unit,
                status: metric.status(value).as_str(),
            })
        })
        .collect()
}

/// Score from the deficiency count: 95 minus 8 per deficiency, kept within 51..=100.
pub fn heuristic_health_score(deficiency_count: usize) -> u8 {
    let count = i64::try_from(deficiency_count).unwrap_or(i64::MAX / DEFICIENCY_PENALTY);
    let score = BASE_SCORE
        .saturating_sub(count.saturating_mul(DEFICIENCY_PENALTY))
        .clamp(MIN_SCORE, MAX_SCORE);
    score as u8
}

/// Build a minimal analysis object straight from the report text.
/// The result goes through the coercer like any model reply.
pub fn extract_heuristic_analysis(report_text: &str) -> Value {
    let findings = find_known_metrics(report_text);

    let mut metrics = Map::new();
    let mut deficiencies = Vec::new();
    let mut supplements = Vec::new();
    let mut recommendations: Vec<String> = Vec::new();
    let mut general_diet = vec![
        "Build each meal around vegetables, whole grains and a lean protein".to_string(),
        "Drink water regularly through the day".to_string(),
    ];

    for finding in &findings {
        let Some(metric) = KNOWN_METRICS.iter().find(|m| m.key == finding.key) else {
            continue;
        };

        metrics.insert(
            finding.key.to_string(),
            json!({
                "value": finding.value,
                "unit": finding.unit,
                "status": finding.status,
                "normalRange": metric.normal_range(),
            }),
        );

        let status = metric.status(finding.value);
        if status == Status::Normal {
            continue;
        }

        let symptoms = match status {
            Status::Low => metric.low_symptoms,
            _ => metric.high_symptoms,
        };
        let prefix = if status == Status::Low { "Low" } else { "High" };

        deficiencies.push(json!({
            "name": format!("{prefix} {}", metric.label),
            "severity": severity_for(metric.deviation(finding.value)),
            "currentValue": format!("{} {}", finding.raw_value, finding.unit),
            "normalRange": metric.normal_range(),
            "symptoms": symptoms,
        }));

        recommendations.push(format!(
            "Discuss your {} {} result with your doctor",
            status.as_str(),
            metric.label.to_lowercase()
        ));

        if status == Status::Low {
            if let Some((name, dosage, reason, duration)) = metric.low_supplement {
                supplements.push(json!({
                    "name": name,
                    "dosage": dosage,
                    "reason": reason,
                    "duration": duration,
                }));
            }
        }

        match (finding.key, status) {
            ("hemoglobin", Status::Low) => general_diet
                .push("Add iron-rich foods such as lentils, spinach and lean red meat".into()),
            ("glucose", Status::High) => general_diet
                .push("Limit refined sugar and white flour; prefer high-fibre carbohydrates".into()),
            ("vitaminD", Status::Low) => general_diet
                .push("Include fortified dairy, eggs and oily fish; get safe sun exposure".into()),
            ("vitaminB12", Status::Low) => general_diet
                .push("Include eggs, dairy, fish or B12-fortified cereals".into()),
            _ => {}
        }
    }

    recommendations.push("Repeat the blood test in 3 months to track changes".into());
    recommendations.push("This is an automated preliminary reading; confirm with a healthcare professional".into());

    let health_score = heuristic_health_score(deficiencies.len());
    let summary = build_summary(&findings, deficiencies.len());

    tracing::info!(
        metrics_found = findings.len(),
        deficiencies = deficiencies.len(),
        health_score,
        "Heuristic analysis produced"
    );

    json!({
        "summary": summary,
        "healthScore": health_score,
        "metrics": Value::Object(metrics),
        "deficiencies": deficiencies,
        "supplements": supplements,
        "dietPlan": {
            "breakfast": ["Oatmeal with fruit and nuts"],
            "lunch": ["Mixed salad with legumes or grilled chicken"],
            "dinner": ["Steamed vegetables with brown rice and a protein"],
            "snacks": ["Fresh fruit", "Yogurt"],
            "avoid": ["Highly processed foods", "Sugary drinks"],
            "general": general_diet,
        },
        "recommendations": recommendations,
    })
}

fn severity_for(deviation: f64) -> &'static str {
    if deviation < 0.10 {
        "mild"
    } else if deviation < 0.25 {
        "moderate"
    } else {
        "severe"
    }
}

fn build_summary(findings: &[HeuristicFinding], deficiency_count: usize) -> String {
    if findings.is_empty() {
        return "Automated analysis could not read this report and no recognised lab values were found. \
                Please review the report with your healthcare provider."
            .to_string();
    }

    let out_of_range: Vec<String> = findings
        .iter()
        .filter(|f| f.status != "normal")
        .map(|f| format!("{} ({})", f.label, f.status))
        .collect();

    if deficiency_count == 0 {
        format!(
            "Preliminary reading of {} recognised lab value(s); all are within the normal range.",
            findings.len()
        )
    } else {
        format!(
            "Preliminary reading of {} recognised lab value(s); {} outside the normal range: {}.",
            findings.len(),
            deficiency_count,
            out_of_range.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_hemoglobin_becomes_deficiency() {
        let analysis = extract_heuristic_analysis("CBC\nHemoglobin: 9.5 g/dL\nWBC: 6.1");
        assert_eq!(analysis["metrics"]["hemoglobin"]["status"], "low");
        assert_eq!(analysis["metrics"]["hemoglobin"]["value"], 9.5);

        let deficiencies = analysis["deficiencies"].as_array().unwrap();
        assert_eq!(deficiencies.len(), 1);
        assert_eq!(deficiencies[0]["currentValue"], "9.5 g/dL");
        assert_eq!(deficiencies[0]["normalRange"], "12-16 g/dL");
        assert_eq!(deficiencies[0]["name"], "Low Hemoglobin");
        assert_eq!(deficiencies[0]["severity"], "moderate");
        assert_eq!(analysis["healthScore"], 87);
    }

    #[test]
    fn normal_values_have_no_deficiencies() {
        let analysis = extract_heuristic_analysis("Hemoglobin 14.2\nFasting Glucose: 88 mg/dL");
        assert_eq!(analysis["metrics"]["hemoglobin"]["status"], "normal");
        assert_eq!(analysis["metrics"]["glucose"]["status"], "normal");
        assert!(analysis["deficiencies"].as_array().unwrap().is_empty());
        assert_eq!(analysis["healthScore"], 95);
    }

    #[test]
    fn high_glucose_is_flagged_high() {
        let findings = find_known_metrics("Blood Glucose (fasting): 142 mg/dL");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].key, "glucose");
        assert_eq!(findings[0].status, "high");

        let analysis = extract_heuristic_analysis("Blood Glucose (fasting): 142 mg/dL");
        assert_eq!(analysis["deficiencies"][0]["name"], "High Glucose");
        assert_eq!(analysis["deficiencies"][0]["severity"], "severe");
    }

    #[test]
    fn vitamins_matched_with_parenthetical() {
        let findings = find_known_metrics("Vitamin D (25-OH): 18 ng/mL\nVitamin B12: 150 pg/mL");
        let keys: Vec<_> = findings.iter().map(|f| (f.key, f.status)).collect();
        assert_eq!(keys, vec![("vitaminD", "low"), ("vitaminB12", "low")]);
    }

    #[test]
    fn low_vitamins_suggest_supplements() {
        let analysis = extract_heuristic_analysis("Vitamin D: 12\nB12: 140");
        let supplements = analysis["supplements"].as_array().unwrap();
        assert_eq!(supplements.len(), 2);
        assert_eq!(supplements[0]["name"], "Vitamin D3");
    }

    #[test]
    fn score_floor_and_penalty() {
        assert_eq!(heuristic_health_score(0), 95);
        assert_eq!(heuristic_health_score(1), 87);
        assert_eq!(heuristic_health_score(5), 55);
        assert_eq!(heuristic_health_score(6), 51);
        assert_eq!(heuristic_health_score(40), 51);
        assert_eq!(heuristic_health_score(usize::MAX), 51);
    }

    #[test]
    fn unknown_text_still_yields_valid_shape() {
        let analysis = extract_heuristic_analysis("Patient seen for follow-up. No labs attached.");
        assert!(analysis["metrics"].as_object().unwrap().is_empty());
        assert!(analysis["deficiencies"].as_array().unwrap().is_empty());
        assert!(analysis["summary"].as_str().unwrap().contains("no recognised lab values"));
        assert_eq!(analysis["healthScore"], 95);
    }

    #[test]
    fn hba1c_is_not_read_as_hemoglobin() {
        assert!(find_known_metrics("HbA1c: 5.4 %").is_empty());
    }

    #[test]
    fn severity_bands() {
        assert_eq!(severity_for(0.05), "mild");
        assert_eq!(severity_for(0.2), "moderate");
        assert_eq!(severity_for(0.5), "severe");
    }
}
