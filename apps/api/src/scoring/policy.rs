//! Weighted requirement policy scoring and the auto-reject decision.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::result::{RequirementMatch, ScoringResult};
use super::{round2, round4};

/// One requirement of a job's policy, derived from the stored requirement
/// config at the start of each scoring pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementRule {
    pub name: String,
    pub weight: f64,
    pub is_mandatory: bool,
}

/// Parses a job's stored requirement config into rules, dropping malformed
/// entries (blank name, non-finite or non-positive weight). Accepts the
/// field aliases HR tooling has written over time.
pub fn parse_requirement_rules(raw: &[Value]) -> Vec<RequirementRule> {
    raw.iter()
        .filter_map(|item| {
            let source = item.as_object()?;

            let name = ["requirementName", "name", "label"].iter().find_map(|key| {
                source
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
            })?;

            let weight = source.get("weight").and_then(Value::as_f64).unwrap_or(0.0);
            if !weight.is_finite() || weight <= 0.0 {
                return None;
            }

            let is_mandatory = source
                .get("isMandatory")
                .and_then(Value::as_bool)
                .or_else(|| source.get("required").and_then(Value::as_bool))
                .unwrap_or(false);

            Some(RequirementRule {
                name: name.to_string(),
                weight,
                is_mandatory,
            })
        })
        .collect()
}

/// Weighted percentage aggregates backing the auto-reject decision.
/// Ephemeral: computed per decision and flattened into the score record.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoRejectBreakdown {
    pub score_percentage: f64,
    pub score_ratio: f64,
    pub mandatory_score_percentage: Option<f64>,
    pub non_mandatory_score_percentage: Option<f64>,
}

fn resolve_match_score(
    score_by_name: &HashMap<String, f64>,
    fallback_matches: &[RequirementMatch],
    requirement_name: &str,
    fallback_index: usize,
) -> f64 {
    if let Some(score) = score_by_name.get(&requirement_name.to_lowercase()) {
        return *score;
    }

    fallback_matches
        .get(fallback_index)
        .map(|m| m.score)
        .unwrap_or(0.0)
}

/// `sum(weight * score) / sum(weight)`, rounded to 2 decimals. `None` when
/// the rule set is empty or carries no weight.
///
/// Scores resolve by lower-cased name first; a rule whose name the oracle
/// never echoed back falls back to the match at the rule's index among ALL
/// rules (`fallback_index_by_name`), not its index within the subset. The
/// positional fallback couples unrelated arrays by index and is fragile
/// under requirement reordering, but existing decisions depend on it.
fn compute_weighted_percentage(
    rules: &[&RequirementRule],
    fallback_index_by_name: &HashMap<String, usize>,
    score_by_name: &HashMap<String, f64>,
    fallback_matches: &[RequirementMatch],
) -> Option<f64> {
    if rules.is_empty() {
        return None;
    }

    let total_weight: f64 = rules.iter().map(|rule| rule.weight).sum();
    if total_weight <= 0.0 {
        return None;
    }

    let weighted_score: f64 = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let fallback_index = fallback_index_by_name
                .get(&rule.name.to_lowercase())
                .copied()
                .unwrap_or(index);
            let score =
                resolve_match_score(score_by_name, fallback_matches, &rule.name, fallback_index);
            score * rule.weight
        })
        .sum();

    Some(round2(weighted_score / total_weight))
}

/// Computes the three weighted aggregates for one scoring pass: all rules,
/// mandatory-only, and non-mandatory-only. The overall aggregate overrides
/// the oracle's own summary score for decision purposes; when no usable
/// rules exist the oracle's overall score stands.
pub fn compute_auto_reject_breakdown(
    result: &ScoringResult,
    rules: &[RequirementRule],
) -> AutoRejectBreakdown {
    let all_rules: Vec<&RequirementRule> = rules.iter().collect();
    let mandatory_rules: Vec<&RequirementRule> = rules.iter().filter(|r| r.is_mandatory).collect();
    let non_mandatory_rules: Vec<&RequirementRule> =
        rules.iter().filter(|r| !r.is_mandatory).collect();

    // First occurrence wins when two rules share a lower-cased name.
    let mut fallback_index_by_name: HashMap<String, usize> = HashMap::new();
    for (index, rule) in rules.iter().enumerate() {
        fallback_index_by_name
            .entry(rule.name.to_lowercase())
            .or_insert(index);
    }

    let score_by_name: HashMap<String, f64> = result
        .matches
        .iter()
        .map(|m| (m.requirement_name.to_lowercase(), m.score))
        .collect();

    let overall_weighted_score = compute_weighted_percentage(
        &all_rules,
        &fallback_index_by_name,
        &score_by_name,
        &result.matches,
    )
    .unwrap_or(result.overall_score);

    AutoRejectBreakdown {
        score_percentage: overall_weighted_score,
        score_ratio: round4(overall_weighted_score / 100.0),
        mandatory_score_percentage: compute_weighted_percentage(
            &mandatory_rules,
            &fallback_index_by_name,
            &score_by_name,
            &result.matches,
        ),
        non_mandatory_score_percentage: compute_weighted_percentage(
            &non_mandatory_rules,
            &fallback_index_by_name,
            &score_by_name,
            &result.matches,
        ),
    }
}

/// HR has stored auto-reject thresholds both as 0-1 ratios and as 0-100
/// percentages. A value at or below 1 is read as a ratio; anything larger
/// as a percentage. Missing or non-numeric values disable auto-reject.
pub fn normalize_threshold_to_ratio(value: Option<&Value>) -> Option<f64> {
    let number = value?.as_f64()?;

    if number <= 1.0 {
        return Some(round4(number.clamp(0.0, 1.0)));
    }

    Some(round4(number.clamp(0.0, 100.0) / 100.0))
}

pub fn to_percentage_from_ratio(value: f64) -> f64 {
    round2(value * 100.0)
}

/// The only two statuses the scoring pipeline itself produces. Reviewed and
/// interview transitions are human-only actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoredStatus {
    Pending,
    Rejected,
}

impl ScoredStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoredStatus::Pending => "pending",
            ScoredStatus::Rejected => "rejected",
        }
    }
}

/// Auto-reject applies only when a threshold is configured.
pub fn decide_auto_reject(threshold_ratio: Option<f64>, score_ratio: f64) -> ScoredStatus {
    match threshold_ratio {
        Some(threshold) if score_ratio < threshold => ScoredStatus::Rejected,
        _ => ScoredStatus::Pending,
    }
}
