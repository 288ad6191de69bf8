use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub title: String,
    /// Requirement policy as configured by HR: array of
    /// `{requirementName|name|label, weight, isMandatory|required, aiContext?}`.
    pub requirements_config: Option<Value>,
    /// Per-job AI knobs; `auto_reject_threshold` lives here.
    pub ai_settings: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Application joined with its job's policy config, as read on the retry
/// and feedback paths.
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationWithJobRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: String,
    pub resume_text: String,
    pub score_record: Option<Value>,
    pub cost_ledger: Option<Value>,
    pub requirements_config: Option<Value>,
    pub ai_settings: Option<Value>,
    pub applicant_email: String,
}

/// One leaderboard row for a job's applications view.
#[derive(Debug, Clone, FromRow)]
pub struct LeaderboardRow {
    pub id: Uuid,
    pub status: String,
    pub score_record: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub applicant_email: String,
    pub referral_count: i64,
}
