use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// AI-matching runs a non-unlimited company may perform per billing cycle.
pub const FREE_MATCHES_PER_CYCLE: i32 = 1;

/// Flat per-candidate cost estimate recorded with each run.
pub const COST_PER_CANDIDATE_USD: f64 = 0.005;

/// The company's subscription ledger row, read before any work starts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub company_id: Uuid,
    pub ai_matching_enabled: bool,
    pub is_trial: bool,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub ai_matches_used_this_month: i32,
    pub ai_matches_reset_date: Option<DateTime<Utc>>,
}

impl SubscriptionRow {
    /// Unlimited matching comes from the paid add-on or from a trial that has
    /// not expired yet at `now`.
    pub fn has_unlimited_ai(&self, now: DateTime<Utc>) -> bool {
        if self.ai_matching_enabled {
            return true;
        }
        self.is_trial && self.trial_end_date.is_some_and(|end| end > now)
    }
}

pub async fn load_subscription(
    pool: &PgPool,
    company_id: Uuid,
) -> Result<Option<SubscriptionRow>> {
    let subscription = sqlx::query_as::<_, SubscriptionRow>(
        "SELECT company_id, ai_matching_enabled, is_trial, trial_end_date, \
                ai_matches_used_this_month, ai_matches_reset_date \
         FROM company_subscriptions WHERE company_id = $1",
    )
    .bind(company_id)
    .fetch_optional(pool)
    .await
    .context("failed to load company subscription")?;

    Ok(subscription)
}

/// Single conditional increment instead of read-then-write, so two
/// concurrent runs cannot both pass as free.
const CLAIM_FREE_RUN_SQL: &str = "UPDATE company_subscriptions \
     SET ai_matches_used_this_month = ai_matches_used_this_month + 1, updated_at = NOW() \
     WHERE company_id = $1 AND ai_matches_used_this_month < $2 \
     RETURNING ai_matches_used_this_month";

/// Atomically claim the company's free monthly run. Returns the counter value
/// after the claim, or `None` when the allowance is already spent.
pub async fn claim_free_run(pool: &PgPool, company_id: Uuid) -> Result<Option<i32>> {
    let claimed: Option<i32> = sqlx::query_scalar(CLAIM_FREE_RUN_SQL)
        .bind(company_id)
        .bind(FREE_MATCHES_PER_CYCLE)
        .fetch_optional(pool)
        .await
        .context("failed to claim free matching run")?;

    Ok(claimed)
}

pub fn estimate_cost(candidates_analyzed: usize) -> f64 {
    candidates_analyzed as f64 * COST_PER_CANDIDATE_USD
}

/// Append-only audit row written once per completed run.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub job_id: Uuid,
    pub company_id: Uuid,
    pub matches_found: i32,
    pub candidates_analyzed: i32,
    pub estimated_cost: f64,
    pub was_free: bool,
}

pub async fn record_usage(pool: &PgPool, record: &UsageRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO ai_match_usage_records \
         (id, job_id, company_id, matches_found, candidates_analyzed, estimated_cost, was_free) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(Uuid::new_v4())
    .bind(record.job_id)
    .bind(record.company_id)
    .bind(record.matches_found)
    .bind(record.candidates_analyzed)
    .bind(record.estimated_cost)
    .bind(record.was_free)
    .execute(pool)
    .await
    .context("failed to insert usage record")?;

    Ok(())
}
