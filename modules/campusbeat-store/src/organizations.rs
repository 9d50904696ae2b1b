use campusbeat_common::Organization;
use sqlx::PgPool;

use crate::error::Result;

/// Read-only access to registered organizations. Registration happens in a
/// separate admin surface; the pipeline only looks organizations up.
#[derive(Clone)]
pub struct PgOrganizationStore {
    pool: PgPool,
}

impl PgOrganizationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the organization linked to an Instagram handle, if any.
    pub async fn find_by_handle(&self, handle: &str) -> Result<Option<Organization>> {
        let row = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, instagram_handle
            FROM organizations
            WHERE instagram_handle = $1
            "#,
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
