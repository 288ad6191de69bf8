//! Scoring pipeline driver: one oracle invocation wrapped in a timeout and
//! retry envelope, followed by the deterministic normalize/enrich stages.

use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::oracle::ScoringOracle;

use super::evidence::EvidenceLinker;
use super::normalize::normalize_scoring_scale;
use super::result::{parse_scoring_payload, CostMeta, ScoringResult};

const SCORING_TIMEOUT: Duration = Duration::from_secs(45);
const TIMEOUT_RETRY_DELAY: Duration = Duration::from_millis(1_200);
const MAX_TIMEOUT_ATTEMPTS: u32 = 2;

/// Which flow triggered the scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringSource {
    Submit,
    Retry,
}

impl ScoringSource {
    fn as_str(self) -> &'static str {
        match self {
            ScoringSource::Submit => "submit",
            ScoringSource::Retry => "retry",
        }
    }
}

/// Identifies a scoring pass in diagnostics so a support lookup by trace
/// id can tell which application and job it belonged to. The application
/// id is absent on first submission (the row does not exist yet).
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext {
    pub source: ScoringSource,
    pub application_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
}

/// A finished scoring pass: normalized, evidence-linked, priced.
#[derive(Debug)]
pub struct ScoringSuccess {
    pub result: ScoringResult,
    pub meta: CostMeta,
}

/// Terminal scoring failure. `error` is already safe for storage and for
/// showing to HR users, and carries the trace suffix for support lookups.
#[derive(Debug)]
pub struct ScoringFailure {
    pub error: String,
    pub trace_id: Uuid,
}

/// Runs the full scoring pipeline against the oracle.
///
/// One trace id covers every attempt of the invocation. Only timeouts are
/// retried, at most [`MAX_TIMEOUT_ATTEMPTS`] attempts total with a short
/// delay in between; any other oracle failure is terminal on first sight.
pub async fn execute_scoring(
    oracle: &dyn ScoringOracle,
    evidence: &EvidenceLinker,
    resume_text: &str,
    requirements: &[Value],
    context: ScoringContext,
) -> Result<ScoringSuccess, ScoringFailure> {
    let trace_id = Uuid::new_v4();
    let normalized_requirements = normalize_oracle_requirements(requirements);
    let source = context.source.as_str();

    for attempt in 1..=MAX_TIMEOUT_ATTEMPTS {
        tracing::info!(
            %trace_id,
            stage = if attempt == 1 { "start" } else { "retry-start" },
            attempt,
            source,
            application_id = ?context.application_id,
            job_id = ?context.job_id,
            requirements = normalized_requirements.len(),
            resume_len = resume_text.len(),
            "scoring attempt"
        );

        let call = oracle.score_resume(resume_text, &normalized_requirements);
        let outcome = match tokio::time::timeout(SCORING_TIMEOUT, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    %trace_id,
                    stage = "attempt-timeout",
                    attempt,
                    source,
                    application_id = ?context.application_id,
                    job_id = ?context.job_id,
                    "scoring attempt timed out"
                );
                if attempt < MAX_TIMEOUT_ATTEMPTS {
                    tokio::time::sleep(TIMEOUT_RETRY_DELAY).await;
                    continue;
                }
                return Err(failure("AI scoring timed out.", trace_id));
            }
        };

        let payload = match outcome {
            Ok(payload) => payload,
            Err(err) => {
                let message = err.to_string();
                tracing::error!(
                    %trace_id,
                    stage = "attempt-exception",
                    attempt,
                    source,
                    application_id = ?context.application_id,
                    job_id = ?context.job_id,
                    error = %message,
                    "scoring oracle error"
                );
                if message.contains("timed out") && attempt < MAX_TIMEOUT_ATTEMPTS {
                    tokio::time::sleep(TIMEOUT_RETRY_DELAY).await;
                    continue;
                }
                return Err(failure(&to_safe_scoring_error(&message), trace_id));
            }
        };

        let Some((result, meta)) = parse_scoring_payload(&payload) else {
            tracing::error!(
                %trace_id,
                stage = "unexpected-success-shape",
                attempt,
                source,
                application_id = ?context.application_id,
                job_id = ?context.job_id,
                "unexpected scoring payload shape"
            );
            return Err(failure(
                "Scoring workflow returned an unexpected result shape.",
                trace_id,
            ));
        };

        let result = evidence.enrich(normalize_scoring_scale(result), resume_text);
        return Ok(ScoringSuccess { result, meta });
    }

    Err(failure("Failed to score application.", trace_id))
}

fn failure(message: &str, trace_id: Uuid) -> ScoringFailure {
    ScoringFailure {
        error: format!("{message} (trace: {trace_id})"),
        trace_id,
    }
}

/// Upstream errors can carry API keys or provider internals in their bodies.
/// Anything that smells like a provider credential problem is replaced with
/// a generic support message before it reaches storage or users.
fn to_safe_scoring_error(message: &str) -> String {
    if message.contains("Incorrect API key provided")
        || message.contains("AI_APICallError")
        || message.to_lowercase().contains("openai")
    {
        return "AI scoring is temporarily unavailable. Please contact support or try again later."
            .to_string();
    }

    message.to_string()
}

/// Prepares a job's stored requirement config for the oracle prompt: only
/// objects pass through, and blank name/context fields are dropped so the
/// prompt template never interpolates empty strings.
fn normalize_oracle_requirements(requirements: &[Value]) -> Vec<Value> {
    requirements
        .iter()
        .filter_map(|item| item.as_object().cloned())
        .map(|mut item| {
            for key in ["requirementName", "name", "aiContext"] {
                let blank = item
                    .get(key)
                    .and_then(Value::as_str)
                    .map(|v| v.trim().is_empty())
                    .unwrap_or(false);
                if blank {
                    item.remove(key);
                }
            }
            Value::Object(item)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedOracle {
        payload: Value,
        calls: AtomicU32,
    }

    impl FixedOracle {
        fn new(payload: Value) -> Self {
            Self {
                payload,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ScoringOracle for FixedOracle {
        async fn score_resume(
            &self,
            _resume_text: &str,
            _requirements: &[Value],
        ) -> Result<Value, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    struct HangingOracle {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ScoringOracle for HangingOracle {
        async fn score_resume(
            &self,
            _resume_text: &str,
            _requirements: &[Value],
        ) -> Result<Value, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    struct FailingOracle {
        message: &'static str,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ScoringOracle for FailingOracle {
        async fn score_resume(
            &self,
            _resume_text: &str,
            _requirements: &[Value],
        ) -> Result<Value, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(OracleError::Api {
                status: 500,
                message: self.message.to_string(),
            })
        }
    }

    fn submit_context() -> ScoringContext {
        ScoringContext {
            source: ScoringSource::Submit,
            application_id: None,
            job_id: Some(Uuid::new_v4()),
        }
    }

    fn scoring_payload() -> Value {
        json!({
            "matches": [
                { "requirementName": "Rust", "score": 8.0, "reasoning": "Rust experience" }
            ],
            "summary": "Good fit.",
            "overallScore": 8.0
        })
    }

    #[tokio::test]
    async fn test_success_normalizes_and_enriches() {
        let oracle = FixedOracle::new(scoring_payload());
        let linker = EvidenceLinker::default();

        let success = execute_scoring(
            &oracle,
            &linker,
            "Rust developer since 2018",
            &[],
            submit_context(),
        )
            .await
            .unwrap();

        // 8/10 scale detected and rescaled
        assert_eq!(success.result.matches[0].score, 80.0);
        assert_eq!(success.result.overall_score, 80.0);
        let spans = success.result.matches[0].evidence_spans.as_ref().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_exactly_once() {
        let oracle = HangingOracle {
            calls: AtomicU32::new(0),
        };
        let linker = EvidenceLinker::default();

        let failure = execute_scoring(&oracle, &linker, "resume", &[], submit_context())
            .await
            .unwrap_err();

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
        assert!(failure.error.contains("AI scoring timed out."));
        assert!(failure
            .error
            .contains(&format!("(trace: {})", failure.trace_id)));
    }

    #[tokio::test]
    async fn test_non_timeout_error_does_not_retry() {
        let oracle = FailingOracle {
            message: "upstream exploded",
            calls: AtomicU32::new(0),
        };
        let linker = EvidenceLinker::default();

        let failure = execute_scoring(&oracle, &linker, "resume", &[], submit_context())
            .await
            .unwrap_err();

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert!(failure.error.contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_credential_errors_are_masked() {
        let oracle = FailingOracle {
            message: "Incorrect API key provided: sk-abc123",
            calls: AtomicU32::new(0),
        };
        let linker = EvidenceLinker::default();

        let failure = execute_scoring(&oracle, &linker, "resume", &[], submit_context())
            .await
            .unwrap_err();

        assert!(!failure.error.contains("sk-abc123"));
        assert!(failure
            .error
            .contains("AI scoring is temporarily unavailable"));
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_terminal() {
        let oracle = FixedOracle::new(json!({ "status": "done" }));
        let linker = EvidenceLinker::default();

        let failure = execute_scoring(&oracle, &linker, "resume", &[], submit_context())
            .await
            .unwrap_err();

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert!(failure.error.contains("unexpected result shape"));
    }

    #[test]
    fn test_requirements_drop_blank_name_fields() {
        let normalized = normalize_oracle_requirements(&[
            json!({ "requirementName": "  ", "name": "Rust", "weight": 5 }),
            json!({ "aiContext": "", "label": "Kafka" }),
            json!("not an object"),
        ]);

        assert_eq!(normalized.len(), 2);
        assert!(normalized[0].get("requirementName").is_none());
        assert_eq!(normalized[0]["name"], "Rust");
        assert!(normalized[1].get("aiContext").is_none());
    }
}
