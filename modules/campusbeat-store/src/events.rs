use campusbeat_common::{Event, NewEvent};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// Persisted events extracted from posts.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bulk-insert events.
    pub async fn insert_many(&self, events: &[NewEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events
                    (post_id, title, description, start_datetime, end_datetime, location, incentives)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.post_id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.start_datetime)
            .bind(event.end_datetime)
            .bind(&event.location)
            .bind(&event.incentives)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Events derived from one post.
    pub async fn find_by_post(&self, post_id: Uuid) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, post_id, title, description, start_datetime, end_datetime,
                   location, incentives
            FROM events
            WHERE post_id = $1
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
