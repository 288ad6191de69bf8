//! Scale normalization for oracle scores.

use super::result::ScoringResult;
use super::round2;

/// Clamps a score onto the canonical 0-100 scale, rounded to 2 decimals.
pub fn clamp_percentage_score(value: f64) -> f64 {
    round2(value.clamp(0.0, 100.0))
}

/// Rescales a raw oracle result onto the 0-100 percentage scale.
///
/// The oracle is instructed to answer in percentages but sometimes answers
/// on a 0-10 scale anyway. If every match score sits at or below 10 the
/// whole result is treated as 0-10 and multiplied up. A legitimately low
/// pre-scaled result (e.g. a lone 8/100) gets rescaled too; that heuristic
/// is preserved as-is for compatibility with previously stored decisions.
pub fn normalize_scoring_scale(mut result: ScoringResult) -> ScoringResult {
    let match_scores: Vec<f64> = result
        .matches
        .iter()
        .map(|m| m.score)
        .filter(|score| score.is_finite())
        .collect();

    if match_scores.is_empty() {
        result.overall_score = clamp_percentage_score(result.overall_score);
        return result;
    }

    let max_match_score = match_scores
        .iter()
        .fold(f64::NEG_INFINITY, |acc, score| acc.max(*score));
    let scale_factor = if max_match_score <= 10.0 { 10.0 } else { 1.0 };

    for m in &mut result.matches {
        m.score = clamp_percentage_score(m.score * scale_factor);
    }

    result.overall_score = if result.overall_score.is_finite() {
        clamp_percentage_score(result.overall_score * scale_factor)
    } else {
        // Oracle gave no usable overall: derive the unweighted mean of the
        // already-rescaled match scores.
        let sum: f64 = result.matches.iter().map(|m| m.score).sum();
        clamp_percentage_score(sum / result.matches.len() as f64)
    };

    result
}
