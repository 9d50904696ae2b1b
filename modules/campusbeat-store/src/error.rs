use campusbeat_common::PostStatus;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No post with id {0}")]
    PostNotFound(Uuid),

    #[error("Invalid post status transition for {post_id}: {from} → {to}")]
    InvalidTransition {
        post_id: Uuid,
        from: PostStatus,
        to: PostStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
