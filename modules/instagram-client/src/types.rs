use chrono::{DateTime, Utc};
use serde::Deserialize;

// --- OAuth token exchange ---

/// Response from the authorization-code exchange endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ShortLivedToken {
    pub access_token: String,
    pub user_id: Option<serde_json::Value>,
    pub permissions: Option<serde_json::Value>,
}

/// Response from the short→long exchange and refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct LongLivedToken {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until expiry.
    pub expires_in: i64,
}

// --- Profile ---

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProfileResponse {
    pub username: String,
}

// --- Media listing and detail ---

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MediaListResponse {
    pub data: Vec<MediaId>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MediaId {
    pub id: String,
}

/// Detailed media object fetched per item id.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaDetail {
    pub id: String,
    pub caption: Option<String>,
    pub media_type: String,
    pub permalink: String,
    pub timestamp: DateTime<Utc>,
}
