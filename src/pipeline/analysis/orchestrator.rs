use chrono::Utc;
use uuid::Uuid;

use super::coerce::coerce_analysis_with_report;
use super::fallback::{ModelCursor, ModelFallbackClient};
use super::heuristic::extract_heuristic_analysis;
use super::openrouter::OpenRouterTransport;
use super::parser::{parse_model_reply, ParsedReply};
use super::prompt::build_analysis_messages;
use super::sanitize::{meaningful_len, sanitize_report_text};
use super::types::{AnalysisOutcome, AnalysisRequest, AnalysisSource, ChatTransport};
use super::AnalysisError;
use crate::config::AnalyzerConfig;

/// Minimum non-whitespace characters for a report to be worth analyzing.
pub const MIN_REPORT_CHARS: usize = 10;

/// Runs the full report pipeline:
/// sanitize → prompt → model cascade → parse → (heuristic) → coerce
pub struct ReportAnalyzer<T> {
    client: ModelFallbackClient<T>,
}

impl ReportAnalyzer<OpenRouterTransport> {
    /// Wire the HTTP transport and model list from configuration.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalysisError> {
        let transport = OpenRouterTransport::from_config(config)?;
        let client = ModelFallbackClient::new(transport, config.models.clone())?
            .with_timeout_fallback(config.fallback_on_timeout);
        Ok(Self::new(client))
    }
}

impl<T: ChatTransport> ReportAnalyzer<T> {
    pub fn new(client: ModelFallbackClient<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ModelFallbackClient<T> {
        &self.client
    }

    /// Analyze one report, starting the model cascade at `start`.
    ///
    /// Only configuration problems and transport failures (including model
    /// exhaustion) are returned as errors. An unusable model reply degrades to
    /// the heuristic extractor and the result is always shape-coerced.
    pub fn analyze(
        &self,
        request: &AnalysisRequest,
        start: ModelCursor,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let request_id = Uuid::new_v4();
        let report_text = sanitize_report_text(&request.report_text);

        if meaningful_len(&report_text) < MIN_REPORT_CHARS {
            return Err(AnalysisError::InputTooShort(MIN_REPORT_CHARS));
        }

        tracing::info!(
            request_id = %request_id,
            start_model = start.index(),
            report_chars = report_text.chars().count(),
            has_profile = request.user_profile.is_some(),
            "Starting report analysis"
        );

        let messages = build_analysis_messages(&report_text, request.user_profile.as_ref());

        let completion = self.client.complete(&messages, start).map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "Report analysis failed");
            e
        })?;

        let (raw, source) = match parse_model_reply(&completion.content) {
            ParsedReply::Structured(value) => (
                value,
                AnalysisSource::Model {
                    model: completion.model.clone(),
                },
            ),
            ParsedReply::Unparseable { reason } => {
                tracing::warn!(
                    request_id = %request_id,
                    model = %completion.model,
                    reason = %reason,
                    "Model reply unusable, using heuristic extraction"
                );
                (
                    extract_heuristic_analysis(&report_text),
                    AnalysisSource::Heuristic {
                        model: completion.model.clone(),
                        reason,
                    },
                )
            }
        };

        let report = coerce_analysis_with_report(raw);
        if !report.repairs.is_empty() {
            tracing::debug!(
                request_id = %request_id,
                repairs = report.repairs.len(),
                "Analysis shape repaired"
            );
        }

        tracing::info!(
            request_id = %request_id,
            model = %completion.model,
            health_score = report.result.health_score,
            deficiencies = report.result.deficiencies.len(),
            "Report analysis complete"
        );

        Ok(AnalysisOutcome {
            request_id,
            result: report.result,
            source,
            cursor: completion.cursor,
            analyzed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::openrouter::MockTransport;

    fn analyzer(reply: &str) -> ReportAnalyzer<MockTransport> {
        let client = ModelFallbackClient::new(
            MockTransport::new(reply),
            vec!["vendor/primary".into(), "vendor/backup".into()],
        )
        .unwrap();
        ReportAnalyzer::new(client)
    }

    #[test]
    fn structured_reply_is_used() {
        let a = analyzer(r#"{"summary": "Fine", "healthScore": 90, "deficiencies": []}"#);
        let outcome = a
            .analyze(&AnalysisRequest::new("Hemoglobin: 14.0 g/dL"), ModelCursor::START)
            .unwrap();
        assert_eq!(outcome.result.summary, "Fine");
        assert_eq!(outcome.result.health_score, 90);
        assert_eq!(
            outcome.source,
            AnalysisSource::Model { model: "vendor/primary".into() }
        );
        assert_eq!(outcome.cursor, ModelCursor::START);
    }

    #[test]
    fn short_report_rejected_before_any_call() {
        let a = analyzer("{}");
        let err = a
            .analyze(&AnalysisRequest::new("  \u{200B} hi \n"), ModelCursor::START)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InputTooShort(MIN_REPORT_CHARS)));
        assert!(a.client().transport().calls().is_empty());
    }

    #[test]
    fn unparseable_reply_falls_back_to_heuristic() {
        let a = analyzer("Sorry, I can only answer in prose today.");
        let outcome = a
            .analyze(&AnalysisRequest::new("Glucose: 130 mg/dL"), ModelCursor::START)
            .unwrap();
        assert!(matches!(outcome.source, AnalysisSource::Heuristic { .. }));
        assert_eq!(outcome.result.metrics["glucose"].status, "high");
        assert_eq!(outcome.result.health_score, 87);
    }

    #[test]
    fn from_config_without_key_fails() {
        let config = AnalyzerConfig::default();
        assert!(matches!(
            ReportAnalyzer::from_config(&config),
            Err(AnalysisError::MissingApiKey)
        ));
    }
}
