use crate::config::AppConfig;
use crate::storage::{AvatarStore, S3AvatarStore};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub avatars: Arc<dyn AvatarStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let avatars = Arc::new(S3AvatarStore::connect(&config.storage).await?) as Arc<dyn AvatarStore>;

        Ok(Self {
            db,
            config,
            avatars,
        })
    }

    pub fn from_parts(db: PgPool, config: Arc<AppConfig>, avatars: Arc<dyn AvatarStore>) -> Self {
        Self {
            db,
            config,
            avatars,
        }
    }

    /// Wall-clock time on campus.
    pub fn campus_now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.config.campus_offset)
    }
}
