use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Row};

const MODULE_AI_MATCHING: &str = "ai_matching";

const DEFAULT_SCORING_MODEL: &str = "openai/gpt-4o-mini";

const DEFAULT_SCORING_INSTRUCTIONS: &str = r#"You evaluate how well a single candidate fits a job opening in the drilling, mining, and offshore energy industries. You receive one job description and one candidate profile per request. Judge skill coverage, certification coverage, experience fit, and geographic practicality. Be conservative: missing safety-critical certifications or skills should lower the score noticeably. Respond with the structured result only; do not include any prose outside the requested fields. Score meanings: match_score is the overall 0-100 fit; location_score is a 0-100 judgment of geographic practicality given the stated locations and distance (use 50 when location information is insufficient); experience_fit is one of under_qualified, good_fit, over_qualified relative to the job's stated experience level."#;

/// Runtime-tunable settings for the matching module, stored in
/// `module_configs` so the prompt and model can change without a rebuild.
#[derive(Clone, Debug)]
pub struct MatchingSettings {
    pub models: MatchingModels,
    pub prompts: MatchingPrompts,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchingModels {
    pub scoring_model: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchingPrompts {
    pub scoring_instructions: String,
}

impl MatchingSettings {
    /// Seed default settings for the matching module if none exist yet.
    pub async fn ensure_defaults(pool: &PgPool) -> Result<()> {
        let models = serde_json::to_value(default_models())?;
        let prompts = serde_json::to_value(default_prompts())?;

        sqlx::query(
            "INSERT INTO module_configs (module_name, models, prompts) VALUES ($1, $2, $3)
             ON CONFLICT (module_name) DO NOTHING",
        )
        .bind(MODULE_AI_MATCHING)
        .bind(&models)
        .bind(&prompts)
        .execute(pool)
        .await
        .context("failed to seed matching module settings")?;

        Ok(())
    }

    pub async fn load(pool: &PgPool) -> Result<Self> {
        let row = sqlx::query(
            "SELECT models, prompts FROM module_configs WHERE module_name = $1",
        )
        .bind(MODULE_AI_MATCHING)
        .fetch_one(pool)
        .await
        .context("failed to load matching module settings")?;

        let models: Value = row.try_get("models")?;
        let prompts: Value = row.try_get("prompts")?;

        let models: MatchingModels =
            serde_json::from_value(models).context("invalid matching models config")?;
        let prompts: MatchingPrompts =
            serde_json::from_value(prompts).context("invalid matching prompts config")?;

        Ok(Self { models, prompts })
    }
}

fn default_models() -> MatchingModels {
    MatchingModels {
        scoring_model: DEFAULT_SCORING_MODEL.to_string(),
    }
}

fn default_prompts() -> MatchingPrompts {
    MatchingPrompts {
        scoring_instructions: DEFAULT_SCORING_INSTRUCTIONS.to_string(),
    }
}
