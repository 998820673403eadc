use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

pub mod oracle;
mod persist;
pub mod pipeline;
pub mod preferences;
pub mod prefilter;
pub mod prescore;
pub mod quota;

use crate::web::{
    AppState, auth,
    auth::JsonAuthError,
    responses::{QuotaRejection, json_failure},
};
use oracle::LlmOracle;
use quota::UsageRecord;

const UPGRADE_URL: &str = "/billing/upgrade";

pub fn router() -> Router<AppState> {
    Router::new().route("/api/jobs/:job_id/matches", post(run_job_matches))
}

/// The job under evaluation. Read-only input for the duration of a run.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub description: String,
    pub required_skills: Vec<String>,
    pub required_certifications: Vec<String>,
    pub experience_level: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub job_type: Option<String>,
}

pub async fn load_job(pool: &PgPool, job_id: Uuid) -> Result<Option<JobRecord>> {
    let job = sqlx::query_as::<_, JobRecord>(
        "SELECT id, company_id, title, description, required_skills, required_certifications, \
                experience_level, location, latitude, longitude, job_type \
         FROM jobs WHERE id = $1",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await
    .context("failed to load job")?;

    Ok(job)
}

#[derive(Serialize)]
struct MatchSummary {
    talent_id: Uuid,
    talent_name: String,
    match_score: i32,
}

#[derive(Serialize)]
struct QuotaInfo {
    has_unlimited: bool,
    is_trial: bool,
    matches_used: i32,
    was_free: bool,
}

#[derive(Serialize)]
struct MatchRunResponse {
    success: bool,
    job_id: Uuid,
    candidates_analyzed: usize,
    matches_found: usize,
    matches: Vec<MatchSummary>,
    quota_info: QuotaInfo,
}

/// Run the full matching pipeline for one job: quota gate, pre-filter,
/// heuristic shortlist, sequential oracle scoring, threshold-gated
/// persistence, usage accounting.
async fn run_job_matches(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MatchRunResponse>, Response> {
    let company = auth::authenticate_company(&state, &headers)
        .await
        .map_err(|JsonAuthError { status, message }| {
            json_failure(status, message).into_response()
        })?;

    let pool = state.pool();

    // A job belonging to another company is reported exactly like a missing
    // one.
    let job = load_job(&pool, job_id)
        .await
        .map_err(internal_error)?
        .filter(|job| job.company_id == company.id)
        .ok_or_else(|| json_failure(StatusCode::NOT_FOUND, "Job not found.").into_response())?;

    let subscription = quota::load_subscription(&pool, company.id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            json_failure(
                StatusCode::CONFLICT,
                "No subscription on record for this company.",
            )
            .into_response()
        })?;

    let now = Utc::now();
    let has_unlimited = subscription.has_unlimited_ai(now);

    // Gate before any candidate work. Non-unlimited companies claim their
    // free monthly run here with a single conditional increment.
    let (was_free, matches_used) = if has_unlimited {
        (false, subscription.ai_matches_used_this_month)
    } else {
        match quota::claim_free_run(&pool, company.id)
            .await
            .map_err(internal_error)?
        {
            Some(used_after_claim) => (true, used_after_claim),
            None => {
                return Err((
                    StatusCode::PAYMENT_REQUIRED,
                    Json(QuotaRejection::new(
                        "Monthly AI matching allowance used. Upgrade to run unlimited matches.",
                        UPGRADE_URL,
                    )),
                )
                    .into_response());
            }
        }
    };

    let prefs = preferences::load_preferences(&pool, company.id)
        .await
        .map_err(internal_error)?;

    let candidates = prefilter::fetch_candidates(&pool, &job, &prefs)
        .await
        .map_err(internal_error)?;
    let pool_size = candidates.len();

    let shortlist = prescore::rank_and_truncate(&job.required_skills, candidates);

    let settings = state.matching_settings();
    let llm_oracle = LlmOracle::new(
        state.llm_client(),
        settings.models.scoring_model.clone(),
        settings.prompts.scoring_instructions.clone(),
    );

    let outcome =
        pipeline::score_candidates(&llm_oracle, &job, &shortlist, prefs.min_match_score).await;

    let mut matches = Vec::with_capacity(outcome.accepted.len());
    for accepted in &outcome.accepted {
        if let Err(err) =
            persist::insert_match(&pool, job.id, accepted.talent_id, &accepted.evaluation).await
        {
            error!(
                ?err,
                %job_id,
                talent_id = %accepted.talent_id,
                "failed to persist match, continuing"
            );
        }
        matches.push(MatchSummary {
            talent_id: accepted.talent_id,
            talent_name: accepted.talent_name.clone(),
            match_score: accepted.evaluation.match_score,
        });
    }

    let usage = UsageRecord {
        job_id: job.id,
        company_id: company.id,
        matches_found: matches.len() as i32,
        candidates_analyzed: outcome.candidates_analyzed as i32,
        estimated_cost: quota::estimate_cost(outcome.candidates_analyzed),
        was_free,
    };
    if let Err(err) = quota::record_usage(&pool, &usage).await {
        error!(?err, %job_id, "failed to record matching usage");
    }

    info!(
        %job_id,
        company = %company.id,
        pool_size,
        shortlisted = shortlist.len(),
        candidates_analyzed = outcome.candidates_analyzed,
        matches_found = matches.len(),
        oracle_exhausted = outcome.oracle_exhausted,
        tokens = llm_oracle.tokens_used(),
        "matching run completed"
    );

    Ok(Json(MatchRunResponse {
        success: true,
        job_id: job.id,
        candidates_analyzed: outcome.candidates_analyzed,
        matches_found: matches.len(),
        matches,
        quota_info: QuotaInfo {
            has_unlimited,
            is_trial: subscription.is_trial,
            matches_used,
            was_free,
        },
    }))
}

fn internal_error(err: anyhow::Error) -> Response {
    error!(?err, "matching pipeline backend error");
    json_failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal error.").into_response()
}
