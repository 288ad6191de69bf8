use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::applications::models::{ApplicationWithJobRow, JobRow, LeaderboardRow};
use crate::errors::AppError;
use crate::scoring::cost::merge_cost_ledger;
use crate::scoring::orchestrator::{execute_scoring, ScoringContext, ScoringSource};
use crate::scoring::policy::{
    compute_auto_reject_breakdown, decide_auto_reject, normalize_threshold_to_ratio,
    parse_requirement_rules, ScoredStatus,
};
use crate::scoring::record::{build_failure_record, build_success_record};
use crate::scoring::result::{parse_feedback_payload, CostMeta, ScoringResult};
use crate::state::AppState;

const MAX_PDF_SIZE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitApplicationResponse {
    pub application_id: Uuid,
    pub status: String,
    pub score: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryScoringResponse {
    pub status: String,
    pub score: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplicationItem {
    pub id: Uuid,
    pub applicant_email: String,
    pub status: String,
    pub score: f64,
    pub matches: Vec<Value>,
    pub has_referral: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub feedback_draft: String,
}

/// One scoring pass turned into the fields the persistence layer writes.
struct ScoringOutcome {
    status: ScoredStatus,
    record: Value,
    meta: Option<CostMeta>,
    score: Option<f64>,
}

/// Runs the scoring pipeline and folds the result into a status, a score
/// record, and an optional cost entry. A failed pass degrades into a
/// `pending` row with a failure record; it never errors out of the caller.
async fn score_application(
    state: &AppState,
    resume_text: &str,
    requirements_config: Option<&Value>,
    ai_settings: Option<&Value>,
    current_record: Option<&Value>,
    context: ScoringContext,
) -> ScoringOutcome {
    let requirements = requirements_config
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    match execute_scoring(
        state.scoring_oracle.as_ref(),
        &state.evidence_linker,
        resume_text,
        &requirements,
        context,
    )
    .await
    {
        Ok(success) => {
            let rules = parse_requirement_rules(&requirements);
            let threshold_ratio = normalize_threshold_to_ratio(
                ai_settings.and_then(|settings| settings.get("auto_reject_threshold")),
            );
            let breakdown = compute_auto_reject_breakdown(&success.result, &rules);
            let status = decide_auto_reject(threshold_ratio, breakdown.score_ratio);

            ScoringOutcome {
                status,
                record: build_success_record(
                    current_record,
                    &success.result,
                    &breakdown,
                    threshold_ratio,
                ),
                score: Some(success.result.overall_score),
                meta: Some(success.meta),
            }
        }
        Err(failure) => ScoringOutcome {
            status: ScoredStatus::Pending,
            record: build_failure_record(current_record, &failure.error, failure.trace_id),
            meta: None,
            score: None,
        },
    }
}

fn extract_resume_text(pdf_bytes: &[u8]) -> Result<String, AppError> {
    let text = pdf_extract::extract_text_from_mem(pdf_bytes)
        .map_err(|e| {
            tracing::warn!("resume pdf extraction failed: {e}");
            AppError::Validation("Could not extract text from the resume PDF.".to_string())
        })?;

    if text.trim().is_empty() {
        return Err(AppError::Validation(
            "Resume PDF contains no extractable text.".to_string(),
        ));
    }

    Ok(text)
}

async fn upsert_applicant(db: &sqlx::PgPool, email: &str) -> Result<Uuid, AppError> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO applicants (id, email)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .fetch_one(db)
    .await?;

    Ok(id)
}

/// "jane.doe-91@example.com" -> "Jane Doe 91"; empty local part falls back
/// to "Candidate".
pub fn derive_candidate_name(email: &str) -> String {
    let local_part = email.split('@').next().unwrap_or("");
    let words: Vec<String> = local_part
        .split(|c: char| matches!(c, '.' | '_' | '-'))
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        return "Candidate".to_string();
    }

    words.join(" ")
}

/// POST /api/v1/jobs/:job_id/applications
pub async fn handle_submit_application(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SubmitApplicationResponse>, AppError> {
    let mut pdf_bytes: Option<Vec<u8>> = None;
    let mut candidate_email: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        match field.name() {
            Some("file") => {
                if field.content_type() != Some("application/pdf") {
                    return Err(AppError::Validation(
                        "Resume must be a PDF file.".to_string(),
                    ));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read resume file: {e}")))?;
                if bytes.len() > MAX_PDF_SIZE_BYTES {
                    return Err(AppError::Validation(
                        "Resume PDF must be smaller than 4MB.".to_string(),
                    ));
                }
                pdf_bytes = Some(bytes.to_vec());
            }
            Some("candidateEmail") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid candidate email: {e}")))?;
                candidate_email = Some(value.trim().to_lowercase());
            }
            _ => {}
        }
    }

    let pdf_bytes =
        pdf_bytes.ok_or_else(|| AppError::Validation("Resume PDF file is required.".to_string()))?;
    let candidate_email = candidate_email
        .filter(|email| !email.is_empty() && email.contains('@'))
        .ok_or_else(|| AppError::Validation("Candidate email is required.".to_string()))?;

    // pdf-extract is synchronous; keep it off the async workers
    let resume_text = tokio::task::spawn_blocking(move || extract_resume_text(&pdf_bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("pdf extraction task failed: {e}")))??;

    let job: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(&state.db)
        .await?;
    let job = job.ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    let outcome = score_application(
        &state,
        &resume_text,
        job.requirements_config.as_ref(),
        job.ai_settings.as_ref(),
        None,
        ScoringContext {
            source: ScoringSource::Submit,
            application_id: None,
            job_id: Some(job_id),
        },
    )
    .await;

    let cost_ledger = outcome
        .meta
        .as_ref()
        .map(|meta| merge_cost_ledger(None, meta));

    let applicant_id = upsert_applicant(&state.db, &candidate_email).await?;
    let application_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO applications
            (id, job_id, applicant_id, status, resume_text, score_record, cost_ledger)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(application_id)
    .bind(job_id)
    .bind(applicant_id)
    .bind(outcome.status.as_str())
    .bind(&resume_text)
    .bind(&outcome.record)
    .bind(&cost_ledger)
    .execute(&state.db)
    .await?;

    Ok(Json(SubmitApplicationResponse {
        application_id,
        status: outcome.status.as_str().to_string(),
        score: outcome.score,
    }))
}

async fn fetch_application_with_job(
    db: &sqlx::PgPool,
    application_id: Uuid,
) -> Result<ApplicationWithJobRow, AppError> {
    let row: Option<ApplicationWithJobRow> = sqlx::query_as(
        r#"
        SELECT a.id, a.job_id, a.status, a.resume_text, a.score_record, a.cost_ledger,
               j.requirements_config, j.ai_settings, ap.email AS applicant_email
        FROM applications a
        JOIN jobs j ON j.id = a.job_id
        JOIN applicants ap ON ap.id = a.applicant_id
        WHERE a.id = $1
        "#,
    )
    .bind(application_id)
    .fetch_optional(db)
    .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Application {application_id} not found")))
}

/// POST /api/v1/applications/:id/retry
pub async fn handle_retry_scoring(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RetryScoringResponse>, AppError> {
    let application = fetch_application_with_job(&state.db, id).await?;

    let outcome = score_application(
        &state,
        &application.resume_text,
        application.requirements_config.as_ref(),
        application.ai_settings.as_ref(),
        application.score_record.as_ref(),
        ScoringContext {
            source: ScoringSource::Retry,
            application_id: Some(application.id),
            job_id: Some(application.job_id),
        },
    )
    .await;

    let cost_ledger = match &outcome.meta {
        Some(meta) => Some(merge_cost_ledger(application.cost_ledger.as_ref(), meta)),
        None => application.cost_ledger.clone(),
    };

    sqlx::query("UPDATE applications SET status = $1, score_record = $2, cost_ledger = $3 WHERE id = $4")
        .bind(outcome.status.as_str())
        .bind(&outcome.record)
        .bind(&cost_ledger)
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(RetryScoringResponse {
        status: outcome.status.as_str().to_string(),
        score: outcome.score,
    }))
}

/// GET /api/v1/jobs/:job_id/applications
pub async fn handle_list_job_applications(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<JobApplicationItem>>, AppError> {
    let job: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(&state.db)
        .await?;
    if job.is_none() {
        return Err(AppError::NotFound(format!("Job {job_id} not found")));
    }

    let rows: Vec<LeaderboardRow> = sqlx::query_as(
        r#"
        SELECT a.id, a.status, a.score_record, a.created_at,
               ap.email AS applicant_email,
               (SELECT count(*) FROM referrals r
                WHERE r.application_id = a.id AND r.status = 'submitted') AS referral_count
        FROM applications a
        JOIN applicants ap ON ap.id = a.applicant_id
        WHERE a.job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_all(&state.db)
    .await?;

    let mut items: Vec<JobApplicationItem> = rows
        .into_iter()
        .map(|row| {
            let record = row.score_record.as_ref();
            let score = record
                .and_then(|r| r.get("overallScore"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let matches = record
                .and_then(|r| r.get("matches"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            JobApplicationItem {
                id: row.id,
                applicant_email: row.applicant_email,
                status: row.status,
                score,
                matches,
                has_referral: row.referral_count > 0,
                created_at: row.created_at,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(Json(items))
}

/// PATCH /api/v1/applications/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    // Human-only transitions; the scoring pipeline never sets these
    if !matches!(req.status.as_str(), "reviewed" | "rejected" | "interview") {
        return Err(AppError::Validation("Invalid status.".to_string()));
    }

    let result = sqlx::query("UPDATE applications SET status = $1 WHERE id = $2")
        .bind(&req.status)
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Application {id} not found")));
    }

    Ok(Json(serde_json::json!({ "status": req.status })))
}

/// POST /api/v1/applications/:id/feedback
pub async fn handle_generate_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let application = fetch_application_with_job(&state.db, id).await?;

    // Idempotent: an existing draft is returned without another oracle call
    if let Some(existing) = application
        .score_record
        .as_ref()
        .and_then(|record| record.get("feedbackDraft"))
        .and_then(Value::as_str)
        .filter(|draft| !draft.is_empty())
    {
        return Ok(Json(FeedbackResponse {
            feedback_draft: existing.to_string(),
        }));
    }

    let scoring_data = application
        .score_record
        .clone()
        .and_then(|record| serde_json::from_value::<ScoringResult>(record).ok())
        .ok_or_else(|| {
            AppError::Unprocessable("Scoring data is unavailable for this application.".to_string())
        })?;

    let candidate_name = derive_candidate_name(&application.applicant_email);
    let scoring_value = serde_json::to_value(&scoring_data)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("scoring data serialization: {e}")))?;

    let payload = state
        .feedback_oracle
        .draft_feedback(&scoring_value, &candidate_name)
        .await
        .map_err(|e| AppError::Oracle(e.to_string()))?;

    let (text, meta) = parse_feedback_payload(&payload, &state.cost_table).ok_or_else(|| {
        AppError::Oracle("Feedback workflow returned an unexpected result shape.".to_string())
    })?;

    let mut record = application
        .score_record
        .as_ref()
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    record.insert("feedbackDraft".to_string(), Value::String(text.clone()));

    let cost_ledger = merge_cost_ledger(application.cost_ledger.as_ref(), &meta);

    sqlx::query("UPDATE applications SET score_record = $1, cost_ledger = $2 WHERE id = $3")
        .bind(Value::Object(record))
        .bind(&cost_ledger)
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(FeedbackResponse {
        feedback_draft: text,
    }))
}
