use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub const DEFAULT_MIN_MATCH_SCORE: i32 = 70;

/// Per-company matching configuration. Read-only input to a run.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchingPreferences {
    pub min_match_score: i32,
    /// `None` disables distance filtering entirely.
    pub max_distance_km: Option<f64>,
}

impl Default for MatchingPreferences {
    fn default() -> Self {
        Self {
            min_match_score: DEFAULT_MIN_MATCH_SCORE,
            max_distance_km: None,
        }
    }
}

/// Companies without a preferences row fall back to the defaults.
pub async fn load_preferences(pool: &PgPool, company_id: Uuid) -> Result<MatchingPreferences> {
    let preferences = sqlx::query_as::<_, MatchingPreferences>(
        "SELECT min_match_score, max_distance_km FROM matching_preferences WHERE company_id = $1",
    )
    .bind(company_id)
    .fetch_optional(pool)
    .await
    .context("failed to load matching preferences")?;

    Ok(preferences.unwrap_or_default())
}
