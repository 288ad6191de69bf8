use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;
use crate::referrals::composite::compute_composite;
use crate::state::AppState;

const RELATIONSHIPS: &[&str] = &["Manager", "Peer", "Mentor"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingInput {
    pub requirement_name: String,
    pub rating: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerProfileInput {
    pub full_name: String,
    pub headline: String,
    pub company: String,
    pub years_experience: i64,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub credentials_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReferralRequest {
    pub application_id: Uuid,
    pub referrer_email: String,
    pub relationship: String,
    pub comment: String,
    pub ratings: Vec<RatingInput>,
    pub referrer_profile: ReferrerProfileInput,
}

impl SubmitReferralRequest {
    fn validate(&self) -> Result<(), AppError> {
        let in_range = |value: &str, min: usize, max: usize| {
            let len = value.trim().chars().count();
            (min..=max).contains(&len)
        };

        let profile = &self.referrer_profile;
        let valid = RELATIONSHIPS.contains(&self.relationship.as_str())
            && in_range(&self.comment, 1, 4000)
            && !self.ratings.is_empty()
            && self.ratings.iter().all(|rating| {
                !rating.requirement_name.trim().is_empty() && (1..=5).contains(&rating.rating)
            })
            && in_range(&profile.full_name, 2, 120)
            && in_range(&profile.headline, 2, 160)
            && in_range(&profile.company, 2, 120)
            && (0..=60).contains(&profile.years_experience)
            && profile
                .linkedin_url
                .as_deref()
                .map_or(true, |url| url.len() <= 300 && url.starts_with("http"))
            && profile
                .credentials_summary
                .as_deref()
                .map_or(true, |summary| summary.chars().count() <= 500);

        if !valid {
            return Err(AppError::Validation(
                "Please complete all referral fields correctly.".to_string(),
            ));
        }

        Ok(())
    }

    fn ratings_json(&self) -> Value {
        Value::Array(
            self.ratings
                .iter()
                .map(|rating| {
                    serde_json::json!({
                        "requirementName": rating.requirement_name.trim(),
                        "rating": rating.rating,
                    })
                })
                .collect(),
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReferralResponse {
    pub application_id: Uuid,
    pub overall_score: f64,
    pub referral_average_rating: f64,
}

#[derive(FromRow)]
struct ReferralTargetRow {
    id: Uuid,
    applicant_email: String,
}

/// POST /api/v1/referrals
///
/// Inserts the vouch, then recomputes the composite over every submitted
/// referral for the application. An aggregation failure blocks the whole
/// submission; no partial composite is ever written.
pub async fn handle_submit_referral(
    State(state): State<AppState>,
    Json(req): Json<SubmitReferralRequest>,
) -> Result<Json<SubmitReferralResponse>, AppError> {
    req.validate()?;

    let application: Option<ReferralTargetRow> = sqlx::query_as(
        r#"
        SELECT a.id, ap.email AS applicant_email
        FROM applications a
        JOIN applicants ap ON ap.id = a.applicant_id
        WHERE a.id = $1
        "#,
    )
    .bind(req.application_id)
    .fetch_optional(&state.db)
    .await?;

    let application = application
        .ok_or_else(|| AppError::NotFound("Application not found.".to_string()))?;

    if application.applicant_email.eq_ignore_ascii_case(req.referrer_email.trim()) {
        return Err(AppError::Validation(
            "You cannot refer yourself.".to_string(),
        ));
    }

    let referrer_profile = serde_json::json!({
        "fullName": req.referrer_profile.full_name.trim(),
        "headline": req.referrer_profile.headline.trim(),
        "company": req.referrer_profile.company.trim(),
        "yearsExperience": req.referrer_profile.years_experience,
        "linkedinUrl": req.referrer_profile.linkedin_url,
        "credentialsSummary": req.referrer_profile.credentials_summary,
    });

    sqlx::query(
        r#"
        INSERT INTO referrals
            (id, application_id, referrer_email, status, relationship, comment,
             ratings, referrer_profile)
        VALUES ($1, $2, $3, 'submitted', $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(application.id)
    .bind(req.referrer_email.trim().to_lowercase())
    .bind(&req.relationship)
    .bind(req.comment.trim())
    .bind(req.ratings_json())
    .bind(&referrer_profile)
    .execute(&state.db)
    .await?;

    // Re-read after the insert so the aggregation sees the latest record
    let (score_record,): (Option<Value>,) =
        sqlx::query_as("SELECT score_record FROM applications WHERE id = $1")
            .bind(application.id)
            .fetch_one(&state.db)
            .await?;

    let ai_base_score = score_record
        .as_ref()
        .and_then(|record| {
            record
                .get("aiBaseScore")
                .and_then(Value::as_f64)
                .or_else(|| record.get("overallScore").and_then(Value::as_f64))
        })
        .ok_or_else(|| {
            AppError::Unprocessable(
                "AI scoring data is unavailable for this application.".to_string(),
            )
        })?;

    let rating_sets: Vec<(Value,)> = sqlx::query_as(
        "SELECT ratings FROM referrals WHERE application_id = $1 AND status = 'submitted'",
    )
    .bind(application.id)
    .fetch_all(&state.db)
    .await?;
    let rating_sets: Vec<Value> = rating_sets.into_iter().map(|(ratings,)| ratings).collect();

    let composite = compute_composite(ai_base_score, &rating_sets)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let updated_record = composite.merge_into_record(score_record.as_ref());

    sqlx::query("UPDATE applications SET score_record = $1 WHERE id = $2")
        .bind(&updated_record)
        .bind(application.id)
        .execute(&state.db)
        .await?;

    Ok(Json(SubmitReferralResponse {
        application_id: application.id,
        overall_score: composite.overall_score,
        referral_average_rating: composite.referral_average_rating,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> SubmitReferralRequest {
        SubmitReferralRequest {
            application_id: Uuid::new_v4(),
            referrer_email: "mentor@example.com".to_string(),
            relationship: "Mentor".to_string(),
            comment: "Worked together for three years.".to_string(),
            ratings: vec![RatingInput {
                requirement_name: "Rust".to_string(),
                rating: 5,
            }],
            referrer_profile: ReferrerProfileInput {
                full_name: "Alex Mentor".to_string(),
                headline: "Principal Engineer".to_string(),
                company: "Acme".to_string(),
                years_experience: 12,
                linkedin_url: Some("https://linkedin.com/in/alex".to_string()),
                credentials_summary: None,
            },
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_unknown_relationship_rejected() {
        let mut req = valid_request();
        req.relationship = "Friend".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_ratings_rejected() {
        let mut req = valid_request();
        req.ratings.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_out_of_band_rating_rejected() {
        let mut req = valid_request();
        req.ratings[0].rating = 6;
        assert!(req.validate().is_err());

        req.ratings[0].rating = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_blank_requirement_name_rejected() {
        let mut req = valid_request();
        req.ratings[0].requirement_name = "   ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_comment_length_bounds() {
        let mut req = valid_request();
        req.comment = " ".to_string();
        assert!(req.validate().is_err());

        req.comment = "x".repeat(4001);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_short_profile_fields_rejected() {
        let mut req = valid_request();
        req.referrer_profile.full_name = "A".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_years_experience_bounds() {
        let mut req = valid_request();
        req.referrer_profile.years_experience = 61;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_ratings_json_trims_names() {
        let mut req = valid_request();
        req.ratings[0].requirement_name = "  Rust  ".to_string();
        let json = req.ratings_json();
        assert_eq!(json[0]["requirementName"], "Rust");
        assert_eq!(json[0]["rating"], 5);
    }
}
