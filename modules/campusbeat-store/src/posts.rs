use campusbeat_common::{NewPost, Post, PostStatus};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Ingested posts and their processing status.
#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bulk-insert posts, silently skipping any whose `source_url` already
    /// exists. Returns the number actually inserted, so callers can log how
    /// much of the batch was new.
    pub async fn insert_many(&self, posts: &[NewPost]) -> Result<u64> {
        if posts.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for post in posts {
            let result = sqlx::query(
                r#"
                INSERT INTO posts (organization_id, source_url, media_url, caption, created_on, status)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (source_url) DO NOTHING
                "#,
            )
            .bind(post.organization_id)
            .bind(&post.source_url)
            .bind(&post.media_url)
            .bind(&post.caption)
            .bind(post.created_on)
            .bind(post.status)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        debug!(
            inserted,
            skipped = posts.len() as u64 - inserted,
            "Post batch saved"
        );
        Ok(inserted)
    }

    /// All posts in one status.
    pub async fn with_status(&self, status: PostStatus) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, organization_id, source_url, media_url, caption, created_on, status
            FROM posts
            WHERE status = $1
            ORDER BY created_on ASC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Posts awaiting extraction: `unprocessed`, plus `processing` posts left
    /// behind by a run that died mid-flight. Both are pre-terminal, so
    /// reclaiming them keeps extraction runs idempotent.
    pub async fn pending_extraction(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, organization_id, source_url, media_url, caption, created_on, status
            FROM posts
            WHERE status = $1 OR status = $2
            ORDER BY created_on ASC
            "#,
        )
        .bind(PostStatus::Unprocessed)
        .bind(PostStatus::Processing)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// All posts for one organization.
    pub async fn find_by_organization(&self, organization_id: Uuid) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, organization_id, source_url, media_url, caption, created_on, status
            FROM posts
            WHERE organization_id = $1
            ORDER BY created_on ASC
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Advance one post's status. Rejects transitions `can_advance` forbids,
    /// so finished posts can never re-enter the pipeline. The UPDATE is
    /// predicated on the status just read, which makes a lost race surface
    /// as a no-op rather than a regression.
    pub async fn advance_status(&self, post_id: Uuid, next: PostStatus) -> Result<()> {
        let current = sqlx::query_scalar::<_, PostStatus>(
            "SELECT status FROM posts WHERE id = $1",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::PostNotFound(post_id))?;

        if !current.can_advance(next) {
            return Err(StoreError::InvalidTransition {
                post_id,
                from: current,
                to: next,
            });
        }

        sqlx::query("UPDATE posts SET status = $2 WHERE id = $1 AND status = $3")
            .bind(post_id)
            .bind(next)
            .bind(current)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
