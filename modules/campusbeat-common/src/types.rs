// Core domain types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// PostStatus
// ---------------------------------------------------------------------------

/// Processing state of an ingested post. Advances monotonically
/// `Unprocessed → Processing → Processed` and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Unprocessed,
    Processing,
    Processed,
}

impl PostStatus {
    /// Whether a transition to `next` is a legal forward step.
    /// Reverse transitions (e.g. `Processed → Unprocessed`) are rejected so a
    /// buggy caller cannot resurrect finished work.
    pub fn can_advance(self, next: PostStatus) -> bool {
        use PostStatus::*;
        matches!(
            (self, next),
            (Unprocessed, Processing) | (Unprocessed, Processed) | (Processing, Processed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Unprocessed => "unprocessed",
            PostStatus::Processing => "processing",
            PostStatus::Processed => "processed",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Organizations and credentials
// ---------------------------------------------------------------------------

/// A registered campus organization. The pipeline only reads these;
/// registration itself happens elsewhere.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub instagram_handle: Option<String>,
}

/// Long-lived Instagram access credential scoped to one organization.
/// At most one row per organization; refresh replaces token and expiry in
/// place, and a failed refresh leaves the prior row in force.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credential {
    pub organization_id: Uuid,
    pub instagram_handle: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Insert/upsert shape for a credential.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub organization_id: Uuid,
    pub instagram_handle: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// One ingested Instagram media item and its processing status.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Permalink on the source platform. Unique — the dedup key.
    pub source_url: String,
    /// Redirect-style media URL derived from the permalink. Resolving it to
    /// a stable CDN URL is the media resolver's job.
    pub media_url: String,
    pub caption: Option<String>,
    pub created_on: DateTime<Utc>,
    pub status: PostStatus,
}

/// Insert shape for a post. Ingestion always starts posts at `Unprocessed`.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub organization_id: Uuid,
    pub source_url: String,
    pub media_url: String,
    pub caption: Option<String>,
    pub created_on: DateTime<Utc>,
    pub status: PostStatus,
}

// ---------------------------------------------------------------------------
// Extraction output
// ---------------------------------------------------------------------------

/// Raw, unvalidated extraction output for one post. Every field is nullable:
/// the model returns null (or worse, the string "null") for anything it
/// could not find. Only candidates that survive normalization become events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCandidate {
    pub post_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    pub location: Option<String>,
    pub incentives: Option<String>,
}

/// A validated, persisted event derived from exactly one post.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub post_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub location: String,
    pub incentives: Option<String>,
}

/// Insert shape for an event.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub post_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub location: String,
    pub incentives: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_advances_forward_only() {
        assert!(PostStatus::Unprocessed.can_advance(PostStatus::Processing));
        assert!(PostStatus::Unprocessed.can_advance(PostStatus::Processed));
        assert!(PostStatus::Processing.can_advance(PostStatus::Processed));
    }

    #[test]
    fn status_never_reverts() {
        assert!(!PostStatus::Processed.can_advance(PostStatus::Unprocessed));
        assert!(!PostStatus::Processed.can_advance(PostStatus::Processing));
        assert!(!PostStatus::Processing.can_advance(PostStatus::Unprocessed));
    }

    #[test]
    fn status_self_transition_is_rejected() {
        assert!(!PostStatus::Unprocessed.can_advance(PostStatus::Unprocessed));
        assert!(!PostStatus::Processed.can_advance(PostStatus::Processed));
    }
}
