//! Boundary types for the oracle payloads.
//!
//! The workflow service is duck-typed JSON on the wire; these parsers turn
//! whatever it returns into the validated, strongly-typed structures the
//! rest of the scoring pipeline operates on. Anything that does not fit the
//! expected shapes is a terminal parse failure, never a partial result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cost::CostTable;

/// Model assumed when the workflow omits usage meta.
pub const DEFAULT_ORACLE_MODEL: &str = "gpt-4o";

/// A resume text span backing one requirement match, in absolute byte
/// offsets into the stored resume text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceSpan {
    pub start: usize,
    pub end: usize,
    pub excerpt: String,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementMatch {
    pub requirement_name: String,
    pub score: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_spans: Option<Vec<EvidenceSpan>>,
}

/// One scoring attempt's full result. Owned by an application and replaced
/// wholesale on re-scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub matches: Vec<RequirementMatch>,
    pub summary: String,
    pub overall_score: f64,
}

impl ScoringResult {
    /// Ingress validation mirroring the workflow's output schema: scores are
    /// finite percentages and evidence spans are well-formed half-open ranges.
    fn is_valid(&self) -> bool {
        if !(self.overall_score.is_finite() && (0.0..=100.0).contains(&self.overall_score)) {
            return false;
        }

        self.matches.iter().all(|m| {
            m.score.is_finite()
                && (0.0..=100.0).contains(&m.score)
                && m.evidence_spans.as_ref().map_or(true, |spans| {
                    spans
                        .iter()
                        .all(|s| s.end >= 1 && s.end > s.start && !s.excerpt.is_empty())
                })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostStep {
    Scoring,
    Feedback,
}

impl CostStep {
    pub fn as_str(self) -> &'static str {
        match self {
            CostStep::Scoring => "scoring",
            CostStep::Feedback => "feedback",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

/// Cost metadata for one oracle call, accumulated into the per-application
/// cost ledger keyed by step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMeta {
    pub step: CostStep,
    pub model: String,
    pub tokens: TokenUsage,
    pub cost: f64,
}

impl CostMeta {
    fn zero(step: CostStep) -> Self {
        Self {
            step,
            model: DEFAULT_ORACLE_MODEL.to_string(),
            tokens: TokenUsage::default(),
            cost: 0.0,
        }
    }
}

/// Parses a raw scoring-workflow payload. The workflow either returns the
/// scoring result directly, or nests it under `result` alongside optional
/// `meta.{model,cost,tokens.{prompt,completion}}` usage data.
pub fn parse_scoring_payload(payload: &Value) -> Option<(ScoringResult, CostMeta)> {
    if !payload.is_object() {
        return None;
    }

    if let Ok(direct) = serde_json::from_value::<ScoringResult>(payload.clone()) {
        if direct.is_valid() {
            return Some((direct, CostMeta::zero(CostStep::Scoring)));
        }
    }

    let nested = serde_json::from_value::<ScoringResult>(payload.get("result")?.clone()).ok()?;
    if !nested.is_valid() {
        return None;
    }

    let meta = payload.get("meta");
    let tokens = meta.and_then(|m| m.get("tokens"));
    let prompt = tokens
        .and_then(|t| t.get("prompt"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let completion = tokens
        .and_then(|t| t.get("completion"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let scoring_meta = CostMeta {
        step: CostStep::Scoring,
        model: meta
            .and_then(|m| m.get("model"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ORACLE_MODEL)
            .to_string(),
        tokens: TokenUsage {
            prompt,
            completion,
            total: prompt + completion,
        },
        cost: meta
            .and_then(|m| m.get("cost"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    };

    Some((nested, scoring_meta))
}

/// Parses a feedback-workflow payload: plain text, or an object carrying
/// `text`/`result` plus usage tokens either under `usage` or at the top
/// level (`promptTokens|inputTokens`, `completionTokens|outputTokens`).
pub fn parse_feedback_payload(payload: &Value, costs: &CostTable) -> Option<(String, CostMeta)> {
    if let Some(text) = payload.as_str() {
        return Some((text.to_string(), CostMeta::zero(CostStep::Feedback)));
    }

    let container = payload.as_object()?;
    let text = container
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| container.get("result").and_then(Value::as_str))
        .filter(|t| !t.is_empty())?;

    let tokens = read_usage(payload);
    let meta = CostMeta {
        step: CostStep::Feedback,
        model: DEFAULT_ORACLE_MODEL.to_string(),
        cost: costs.calculate(DEFAULT_ORACLE_MODEL, tokens.prompt, tokens.completion),
        tokens,
    };

    Some((text.to_string(), meta))
}

fn read_usage(source: &Value) -> TokenUsage {
    let container = source
        .get("usage")
        .filter(|u| u.is_object())
        .unwrap_or(source);

    let read = |primary: &str, alias: &str| -> u64 {
        let value = container
            .get(primary)
            .and_then(Value::as_f64)
            .or_else(|| container.get(alias).and_then(Value::as_f64))
            .unwrap_or(0.0);
        value.max(0.0).trunc() as u64
    };

    let prompt = read("promptTokens", "inputTokens");
    let completion = read("completionTokens", "outputTokens");

    TokenUsage {
        prompt,
        completion,
        total: prompt + completion,
    }
}
