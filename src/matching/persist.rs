use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::matching::oracle::CandidateEvaluation;

/// Plain INSERT: repeated runs for the same (job, talent) pair append new
/// rows rather than updating earlier ones. Matches the schema, which carries
/// no uniqueness constraint on (job_id, talent_id).
const INSERT_MATCH_SQL: &str = "INSERT INTO talent_job_matches \
     (id, job_id, talent_id, match_score, reasoning, skills_matched, skills_missing, \
      certifications_matched, certifications_missing, experience_fit, location_score) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

/// Persist one accepted match.
pub async fn insert_match(
    pool: &PgPool,
    job_id: Uuid,
    talent_id: Uuid,
    evaluation: &CandidateEvaluation,
) -> Result<()> {
    sqlx::query(INSERT_MATCH_SQL)
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(talent_id)
        .bind(evaluation.match_score)
        .bind(&evaluation.reasoning)
        .bind(&evaluation.skills_matched)
        .bind(&evaluation.skills_missing)
        .bind(&evaluation.certifications_matched)
        .bind(&evaluation.certifications_missing)
        .bind(evaluation.experience_fit.as_str())
        .bind(evaluation.location_score)
        .execute(pool)
        .await
        .context("failed to insert talent job match")?;

    Ok(())
}
