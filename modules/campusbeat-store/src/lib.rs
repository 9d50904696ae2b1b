//! Postgres persistence for the CampusBeat pipeline.
//!
//! One store handle per table, all cloneable wrappers around a shared
//! `PgPool`. Constructed once at process start and passed into pipeline
//! components — no module-level singletons.

pub mod credentials;
pub mod error;
pub mod events;
pub mod organizations;
pub mod posts;

pub use credentials::PgCredentialStore;
pub use error::{Result, StoreError};
pub use events::PgEventStore;
pub use organizations::PgOrganizationStore;
pub use posts::PgPostStore;

use sqlx::PgPool;
use tracing::info;

/// Run the embedded SQL migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Other(e.into()))?;
    info!("Database migrations applied");
    Ok(())
}
