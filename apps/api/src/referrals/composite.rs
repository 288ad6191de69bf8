//! Referral composite scoring: blends the stored AI base score with
//! aggregated human vouch ratings into one final composite score.
//!
//! Every submission re-aggregates over the complete set of submitted
//! referrals for the application. The composite is a pure function of that
//! set plus the base score, so concurrent submissions converge on whatever
//! the last writer computed.

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::scoring::round2;

pub const JUSTIFICATION_MODEL: &str = "deterministic_referral_policy";

#[derive(Debug, Error, PartialEq)]
pub enum CompositeError {
    #[error("Referral ratings are invalid.")]
    EmptyRatings,
}

/// Mean rating for one requirement across all referrers, 2 decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementAverage {
    pub requirement_name: String,
    pub average_rating: f64,
    pub rating_count: u64,
}

/// Qualitative read of the per-requirement averages: strengths at 4/5 and
/// up, concerns at 2.5/5 and below, the rest neutral.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralJustification {
    pub model: &'static str,
    pub positives: Vec<String>,
    pub negatives: Vec<String>,
    pub neutrals: Vec<String>,
}

/// The full composite payload written onto the score record.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeScore {
    pub ai_base_score: f64,
    pub ai_contribution: f64,
    pub referral_average_rating: f64,
    pub referral_contribution: f64,
    pub overall_score: f64,
    pub requirement_averages: Vec<RequirementAverage>,
    pub justification: ReferralJustification,
}

fn each_rating(rating_sets: &[Value]) -> impl Iterator<Item = &Value> {
    rating_sets
        .iter()
        .filter_map(Value::as_array)
        .flatten()
}

/// Mean of every valid rating value across all referrals, unrounded.
/// Ratings outside the 1-5 band or non-numeric are skipped; `None` when
/// nothing valid remains.
pub fn calculate_average_rating(rating_sets: &[Value]) -> Option<f64> {
    let values: Vec<f64> = each_rating(rating_sets)
        .filter_map(|item| item.get("rating"))
        .filter_map(Value::as_f64)
        .filter(|value| value.is_finite() && (1.0..=5.0).contains(value))
        .collect();

    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Groups ratings by trimmed requirement name and averages each group,
/// sorted by average descending. Grouping is exact-match on the trimmed
/// name; casing variants stay separate buckets.
pub fn build_requirement_averages(rating_sets: &[Value]) -> Vec<RequirementAverage> {
    let mut buckets: Vec<(String, f64, u64)> = Vec::new();

    for item in each_rating(rating_sets) {
        let Some(name) = item
            .get("requirementName")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            continue;
        };
        let Some(rating) = item
            .get("rating")
            .and_then(Value::as_f64)
            .filter(|value| value.is_finite())
        else {
            continue;
        };

        match buckets.iter_mut().find(|(key, _, _)| key == name) {
            Some((_, total, count)) => {
                *total += rating;
                *count += 1;
            }
            None => buckets.push((name.to_string(), rating, 1)),
        }
    }

    let mut averages: Vec<RequirementAverage> = buckets
        .into_iter()
        .map(|(requirement_name, total, count)| RequirementAverage {
            requirement_name,
            average_rating: round2(total / count as f64),
            rating_count: count,
        })
        .collect();

    averages.sort_by(|a, b| {
        b.average_rating
            .partial_cmp(&a.average_rating)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    averages
}

/// Renders a rating the way dashboards show numbers: no trailing zeros,
/// so 4.0 reads "4" and 4.5 reads "4.5".
fn format_rating(value: f64) -> String {
    let mut text = format!("{value:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text
}

pub fn build_justification(averages: &[RequirementAverage]) -> ReferralJustification {
    let label = |item: &RequirementAverage| {
        format!(
            "{} ({}/5)",
            item.requirement_name,
            format_rating(item.average_rating)
        )
    };

    ReferralJustification {
        model: JUSTIFICATION_MODEL,
        positives: averages
            .iter()
            .filter(|item| item.average_rating >= 4.0)
            .map(label)
            .collect(),
        negatives: averages
            .iter()
            .filter(|item| item.average_rating <= 2.5)
            .map(label)
            .collect(),
        neutrals: averages
            .iter()
            .filter(|item| item.average_rating > 2.5 && item.average_rating < 4.0)
            .map(label)
            .collect(),
    }
}

/// Blends the AI base score with the referral average:
/// `0.8 × base + 20 × average`, each contribution rounded to 2 decimals
/// before summing. A perfect 5/5 average contributes 100, so the composite
/// can exceed 100; it is stored unclamped.
pub fn compute_composite(
    ai_base_score: f64,
    rating_sets: &[Value],
) -> Result<CompositeScore, CompositeError> {
    let referral_average_rating =
        calculate_average_rating(rating_sets).ok_or(CompositeError::EmptyRatings)?;

    let ai_contribution = round2(ai_base_score * 0.8);
    let referral_contribution = round2(referral_average_rating * 20.0);
    let requirement_averages = build_requirement_averages(rating_sets);
    let justification = build_justification(&requirement_averages);

    Ok(CompositeScore {
        ai_base_score,
        ai_contribution,
        referral_average_rating,
        referral_contribution,
        overall_score: round2(ai_contribution + referral_contribution),
        requirement_averages,
        justification,
    })
}

impl CompositeScore {
    /// Writes the composite fields over the stored score record, preserving
    /// everything else already on it.
    pub fn merge_into_record(&self, current: Option<&Value>) -> Value {
        let mut record = current
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(Map::new);

        record.insert("aiBaseScore".to_string(), json!(self.ai_base_score));
        record.insert("aiContribution".to_string(), json!(self.ai_contribution));
        record.insert("overallScore".to_string(), json!(self.overall_score));
        record.insert(
            "referralAverageRating".to_string(),
            json!(self.referral_average_rating),
        );
        record.insert(
            "referralContribution".to_string(),
            json!(self.referral_contribution),
        );
        record.insert(
            "referralRequirementAverages".to_string(),
            serde_json::to_value(&self.requirement_averages).unwrap_or(Value::Null),
        );
        record.insert(
            "referralJustification".to_string(),
            serde_json::to_value(&self.justification).unwrap_or(Value::Null),
        );
        record.insert("referralBoost".to_string(), json!(true));

        Value::Object(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratings(entries: &[(&str, f64)]) -> Value {
        Value::Array(
            entries
                .iter()
                .map(|(name, rating)| json!({ "requirementName": name, "rating": rating }))
                .collect(),
        )
    }

    #[test]
    fn test_average_flattens_across_referrals() {
        let sets = vec![
            ratings(&[("Rust", 5.0), ("Kafka", 3.0)]),
            ratings(&[("Rust", 4.0)]),
        ];
        assert_eq!(calculate_average_rating(&sets), Some(4.0));
    }

    #[test]
    fn test_average_skips_out_of_band_values() {
        let sets = vec![ratings(&[("Rust", 0.0), ("Rust", 9.0), ("Rust", 3.0)])];
        assert_eq!(calculate_average_rating(&sets), Some(3.0));
    }

    #[test]
    fn test_average_of_nothing_valid_is_none() {
        assert_eq!(calculate_average_rating(&[]), None);
        assert_eq!(
            calculate_average_rating(&[json!("garbage"), ratings(&[("Rust", 7.0)])]),
            None
        );
    }

    #[test]
    fn test_requirement_averages_group_and_sort_descending() {
        let sets = vec![
            ratings(&[("Kafka", 2.0), ("Rust", 5.0)]),
            ratings(&[("Kafka", 3.0), ("Rust", 4.0)]),
        ];

        let averages = build_requirement_averages(&sets);
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].requirement_name, "Rust");
        assert_eq!(averages[0].average_rating, 4.5);
        assert_eq!(averages[0].rating_count, 2);
        assert_eq!(averages[1].requirement_name, "Kafka");
        assert_eq!(averages[1].average_rating, 2.5);
    }

    #[test]
    fn test_requirement_names_are_trimmed_exact_match() {
        let sets = vec![ratings(&[("  Rust  ", 4.0), ("Rust", 2.0), ("rust", 5.0)])];
        let averages = build_requirement_averages(&sets);

        // Trimming merges whitespace variants; casing stays distinct.
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].requirement_name, "rust");
        assert_eq!(averages[1].requirement_name, "Rust");
        assert_eq!(averages[1].average_rating, 3.0);
    }

    #[test]
    fn test_justification_buckets_and_label_format() {
        let sets = vec![ratings(&[
            ("Rust", 4.0),
            ("Kafka", 2.5),
            ("SQL", 3.0),
            ("Docker", 4.5),
        ])];

        let justification = build_justification(&build_requirement_averages(&sets));
        assert_eq!(justification.model, "deterministic_referral_policy");
        assert_eq!(
            justification.positives,
            vec!["Docker (4.5/5)".to_string(), "Rust (4/5)".to_string()]
        );
        assert_eq!(justification.negatives, vec!["Kafka (2.5/5)".to_string()]);
        assert_eq!(justification.neutrals, vec!["SQL (3/5)".to_string()]);
    }

    #[test]
    fn test_format_rating_drops_trailing_zeros() {
        assert_eq!(format_rating(4.0), "4");
        assert_eq!(format_rating(4.5), "4.5");
        assert_eq!(format_rating(4.33), "4.33");
    }

    #[test]
    fn test_composite_formula_can_exceed_100() {
        let sets = vec![ratings(&[("Rust", 4.0)])];
        let composite = compute_composite(70.0, &sets).unwrap();

        assert_eq!(composite.ai_contribution, 56.0);
        assert_eq!(composite.referral_contribution, 80.0);
        assert_eq!(composite.overall_score, 136.0);
    }

    #[test]
    fn test_composite_rejects_empty_ratings() {
        assert_eq!(
            compute_composite(70.0, &[]).unwrap_err(),
            CompositeError::EmptyRatings
        );
    }

    #[test]
    fn test_merge_preserves_existing_record_fields() {
        let sets = vec![ratings(&[("Rust", 5.0)])];
        let composite = compute_composite(50.0, &sets).unwrap();

        let current = json!({ "summary": "Solid.", "scoringStatus": "success" });
        let record = composite.merge_into_record(Some(&current));

        assert_eq!(record["summary"], "Solid.");
        assert_eq!(record["scoringStatus"], "success");
        assert_eq!(record["aiBaseScore"], 50.0);
        assert_eq!(record["overallScore"], 140.0);
        assert_eq!(record["referralBoost"], true);
        assert_eq!(
            record["referralJustification"]["positives"][0],
            "Rust (5/5)"
        );
        assert_eq!(
            record["referralRequirementAverages"][0]["requirementName"],
            "Rust"
        );
    }
}
