// File: chatgate-core/src/db/mod.rs
//! Postgres storage for the viewer ledger and persisted cooldown state.

use std::time::Duration;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::Error;
use crate::repositories::{PostgresCooldownRepository, PostgresViewerRepository};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    /// Connects and applies the schema in the workspace `migrations/` folder.
    pub async fn open(database_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;
        info!("Connected to Postgres (max_connections={})", MAX_CONNECTIONS);

        sqlx::migrate!("../migrations").run(&pool).await?;
        info!("Viewer and cooldown schema is up to date");
        Ok(Self { pool })
    }

    pub fn viewer_repository(&self) -> PostgresViewerRepository {
        PostgresViewerRepository::new(self.pool.clone())
    }

    pub fn cooldown_repository(&self) -> PostgresCooldownRepository {
        PostgresCooldownRepository::new(self.pool.clone())
    }
}
