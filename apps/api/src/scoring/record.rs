//! Builders for the score record stored on each application.
//!
//! The record is schemaless JSON in the database: the scoring result
//! flattened together with the auto-reject decision fields, later extended
//! in place by the referral composite. Dashboards read it as-is.

use serde_json::{json, Value};
use uuid::Uuid;

use super::policy::{to_percentage_from_ratio, AutoRejectBreakdown};
use super::result::ScoringResult;

/// Decision-basis tag stamped on every successful score record so stored
/// decisions stay interpretable if the weighting scheme ever changes.
pub const AUTO_REJECT_BASIS: &str = "weighted_percentage_mandatory_optional";

/// Flattens a successful scoring pass into the stored record: the scoring
/// result's own fields plus the weighted aggregates and the threshold that
/// was in force, as a percentage, or null when auto-reject was disabled.
/// New fields shallow-merge over the existing record, so a cached
/// `feedbackDraft` and referral composite fields survive a re-score;
/// `referralBoost` resets to false until the next referral re-aggregates.
pub fn build_success_record(
    current: Option<&Value>,
    result: &ScoringResult,
    breakdown: &AutoRejectBreakdown,
    threshold_ratio: Option<f64>,
) -> Value {
    let mut record = current
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Ok(Value::Object(fields)) = serde_json::to_value(result) {
        record.extend(fields);
    }

    record.insert(
        "autoRejectScore".to_string(),
        json!(breakdown.score_percentage),
    );
    record.insert(
        "autoRejectThreshold".to_string(),
        json!(threshold_ratio.map(to_percentage_from_ratio)),
    );
    record.insert(
        "mandatoryWeightedScore".to_string(),
        json!(breakdown.mandatory_score_percentage),
    );
    record.insert(
        "nonMandatoryWeightedScore".to_string(),
        json!(breakdown.non_mandatory_score_percentage),
    );
    record.insert("autoRejectBasis".to_string(), json!(AUTO_REJECT_BASIS));
    record.insert("aiBaseScore".to_string(), json!(result.overall_score));
    record.insert("referralBoost".to_string(), json!(false));
    record.insert("scoringStatus".to_string(), json!("success"));

    Value::Object(record)
}

/// Marks a failed scoring pass on the record. Existing record fields (a
/// previous successful score, referral data) are preserved so a failed
/// retry never erases history; only the status, error, and trace change.
pub fn build_failure_record(current: Option<&Value>, error: &str, trace_id: Uuid) -> Value {
    let mut record = current
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    record.insert("scoringStatus".to_string(), json!("failed"));
    record.insert("scoringError".to_string(), json!(error));
    record.insert("scoringTraceId".to_string(), json!(trace_id.to_string()));

    Value::Object(record)
}
