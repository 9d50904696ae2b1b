use campusbeat_common::{Credential, NewCredential};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// One long-lived Instagram credential per organization.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace the credential for an organization. On conflict the
    /// handle, token, and expiry are all overwritten.
    pub async fn upsert(&self, credential: NewCredential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (organization_id, instagram_handle, access_token, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (organization_id) DO UPDATE
            SET instagram_handle = EXCLUDED.instagram_handle,
                access_token = EXCLUDED.access_token,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(credential.organization_id)
        .bind(&credential.instagram_handle)
        .bind(&credential.access_token)
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every stored credential, in no particular order.
    pub async fn all(&self) -> Result<Vec<Credential>> {
        let rows = sqlx::query_as::<_, Credential>(
            r#"
            SELECT organization_id, instagram_handle, access_token, expires_at
            FROM credentials
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Credentials expiring at or before `cutoff`.
    pub async fn expiring_within(&self, cutoff: DateTime<Utc>) -> Result<Vec<Credential>> {
        let rows = sqlx::query_as::<_, Credential>(
            r#"
            SELECT organization_id, instagram_handle, access_token, expires_at
            FROM credentials
            WHERE expires_at <= $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Replace token and expiry after a successful upstream refresh.
    /// A failed refresh never reaches this point, so the prior token stays
    /// in force.
    pub async fn update_token(
        &self,
        organization_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE credentials
            SET access_token = $2, expires_at = $3
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .bind(access_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove an organization's credential (explicit revocation).
    pub async fn delete_for_organization(&self, organization_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
