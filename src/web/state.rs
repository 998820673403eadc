use std::{env, sync::Arc};

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{config::MatchingSettings, llm::LlmClient};

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    settings: Arc<MatchingSettings>,
    llm: LlmClient,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;

        let llm_client = LlmClient::from_env().context("failed to initialize LLM client")?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        MatchingSettings::ensure_defaults(&pool)
            .await
            .context("failed to seed default matching settings")?;
        let settings = MatchingSettings::load(&pool)
            .await
            .context("failed to load matching settings")?;

        Ok(Self {
            pool,
            settings: Arc::new(settings),
            llm: llm_client,
        })
    }

    pub fn llm_client(&self) -> LlmClient {
        self.llm.clone()
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn pool_ref(&self) -> &PgPool {
        &self.pool
    }

    pub fn matching_settings(&self) -> Arc<MatchingSettings> {
        self.settings.clone()
    }
}
