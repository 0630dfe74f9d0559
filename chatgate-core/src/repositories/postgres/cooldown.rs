// File: chatgate-core/src/repositories/postgres/cooldown.rs

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use chrono::{DateTime, Utc};

use chatgate_common::models::{CooldownSnapshot, EventExecution, EventType, UserCooldownEntry};
use chatgate_common::traits::repository_traits::CooldownRepository;
use crate::Error;

/// Stores the governor's snapshot in two tables; `save` rewrites both in one transaction.
#[derive(Clone)]
pub struct PostgresCooldownRepository {
    pool: Pool<Postgres>,
}

impl PostgresCooldownRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CooldownRepository for PostgresCooldownRepository {
    async fn load(&self) -> Result<CooldownSnapshot, Error> {
        let rows = sqlx::query(
            r#"
            SELECT identity_key, command_name, last_used
            FROM user_cooldowns
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        let mut user_cooldowns = Vec::with_capacity(rows.len());
        for row in rows {
            user_cooldowns.push(UserCooldownEntry {
                identity_key: row.try_get("identity_key")?,
                command_name: row.try_get("command_name")?,
                last_used: row.try_get::<DateTime<Utc>, _>("last_used")?,
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT event_type, executed_at
            FROM event_executions
            ORDER BY executed_at ASC
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        let mut event_executions = Vec::with_capacity(rows.len());
        for row in rows {
            let event_type: String = row.try_get("event_type")?;
            event_executions.push(EventExecution {
                event_type: event_type.parse::<EventType>()?,
                executed_at: row.try_get::<DateTime<Utc>, _>("executed_at")?,
            });
        }

        Ok(CooldownSnapshot { user_cooldowns, event_executions })
    }

    async fn save(&self, snapshot: &CooldownSnapshot) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_cooldowns")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM event_executions")
            .execute(&mut *tx)
            .await?;

        for entry in &snapshot.user_cooldowns {
            sqlx::query(
                r#"
                INSERT INTO user_cooldowns (identity_key, command_name, last_used)
                VALUES ($1, $2, $3)
                "#,
            )
                .bind(&entry.identity_key)
                .bind(&entry.command_name)
                .bind(entry.last_used)
                .execute(&mut *tx)
                .await?;
        }

        for exec in &snapshot.event_executions {
            sqlx::query(
                r#"
                INSERT INTO event_executions (event_type, executed_at)
                VALUES ($1, $2)
                "#,
            )
                .bind(exec.event_type.to_string())
                .bind(exec.executed_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
