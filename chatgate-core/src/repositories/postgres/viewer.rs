// File: chatgate-core/src/repositories/postgres/viewer.rs

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use chrono::{DateTime, Utc};

use chatgate_common::models::{Platform, Viewer, ViewerRoles};
use chatgate_common::traits::repository_traits::ViewerRepository;
use crate::Error;

#[derive(Clone)]
pub struct PostgresViewerRepository {
    pool: Pool<Postgres>,
}

impl PostgresViewerRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn viewer_from_row(r: &PgRow) -> Result<Viewer, Error> {
    let platform: String = r.try_get("platform")?;
    Ok(Viewer {
        identity_key: r.try_get("identity_key")?,
        platform: platform.parse::<Platform>()?,
        username: r.try_get("username")?,
        roles: ViewerRoles {
            subscriber: r.try_get("is_subscriber")?,
            vip: r.try_get("is_vip")?,
            moderator: r.try_get("is_moderator")?,
            broadcaster: r.try_get("is_broadcaster")?,
        },
        banned: r.try_get("is_banned")?,
        coins: r.try_get("coins")?,
        karma: r.try_get("karma")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        last_seen: r.try_get::<DateTime<Utc>, _>("last_seen")?,
    })
}

const SELECT_VIEWER: &str = r#"
    SELECT identity_key, platform, username,
           is_subscriber, is_vip, is_moderator, is_broadcaster, is_banned,
           coins, karma, created_at, last_seen
    FROM viewers
    WHERE identity_key = $1
"#;

#[async_trait]
impl ViewerRepository for PostgresViewerRepository {
    async fn get_or_create(&self, template: &Viewer) -> Result<Viewer, Error> {
        // ON CONFLICT keeps creation atomic per identity key across connectors.
        sqlx::query(
            r#"
            INSERT INTO viewers (
                identity_key, platform, username,
                is_subscriber, is_vip, is_moderator, is_broadcaster, is_banned,
                coins, karma, created_at, last_seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (identity_key) DO NOTHING
            "#,
        )
            .bind(&template.identity_key)
            .bind(template.platform.to_string())
            .bind(&template.username)
            .bind(template.roles.subscriber)
            .bind(template.roles.vip)
            .bind(template.roles.moderator)
            .bind(template.roles.broadcaster)
            .bind(template.banned)
            .bind(template.coins)
            .bind(template.karma)
            .bind(template.created_at)
            .bind(template.last_seen)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query(SELECT_VIEWER)
            .bind(&template.identity_key)
            .fetch_one(&self.pool)
            .await?;
        viewer_from_row(&row)
    }

    async fn get(&self, identity_key: &str) -> Result<Option<Viewer>, Error> {
        let row = sqlx::query(SELECT_VIEWER)
            .bind(identity_key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(viewer_from_row(&r)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, viewer: &Viewer) -> Result<(), Error> {
        let result = sqlx::query(
            r#"
            UPDATE viewers
            SET username = $2,
                is_subscriber = $3,
                is_vip = $4,
                is_moderator = $5,
                is_broadcaster = $6,
                is_banned = $7,
                coins = $8,
                karma = $9,
                last_seen = $10
            WHERE identity_key = $1
            "#,
        )
            .bind(&viewer.identity_key)
            .bind(&viewer.username)
            .bind(viewer.roles.subscriber)
            .bind(viewer.roles.vip)
            .bind(viewer.roles.moderator)
            .bind(viewer.roles.broadcaster)
            .bind(viewer.banned)
            .bind(viewer.coins)
            .bind(viewer.karma)
            .bind(viewer.last_seen)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("viewer '{}'", viewer.identity_key)));
        }
        Ok(())
    }
}
