// Test doubles for the pipeline trait boundaries.
//
// - MockSource (SourcePlatform) — HashMap-programmed Instagram API
// - MockResolver (ImageResolver) — HashMap-based URL→CDN mapping
// - MockBatchBackend (ExtractionBackend) — echoes programmed extraction
//   results back through the batch output format
// - MemoryOrganizationDirectory / MemoryCredentialStore / MemoryPostStore /
//   MemoryEventStore — stateful in-memory stores
//
// No network, no database. `cargo test` in seconds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use campusbeat_common::{
    Credential, Event, NewCredential, NewEvent, NewPost, Organization, Post, PostStatus,
};
use instagram_client::resolve::ResolveError;
use instagram_client::types::{LongLivedToken, MediaDetail, ShortLivedToken};
use instagram_client::InstagramError;
use openai_batch_client::types::{Batch, FileObject};
use openai_batch_client::BatchError;

use crate::traits::{
    CredentialStore, EventStore, ExtractionBackend, ImageResolver, OrganizationDirectory,
    PostStore, SourcePlatform,
};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Programmable Instagram API. Builder pattern: `.on_code()`, `.on_handle()`,
/// `.on_long_exchange()`, `.on_refresh()`, `.on_media()`.
#[derive(Default)]
pub struct MockSource {
    codes: HashMap<String, String>,
    handles: HashMap<String, String>,
    long_tokens: HashMap<String, (String, i64)>,
    refreshes: HashMap<String, (String, i64)>,
    media: HashMap<String, Vec<MediaDetail>>,
    failing_details: HashSet<String>,
    refresh_attempts: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorization code → short-lived token.
    pub fn on_code(mut self, code: &str, short_token: &str) -> Self {
        self.codes.insert(code.to_string(), short_token.to_string());
        self
    }

    /// Short-lived token → account handle.
    pub fn on_handle(mut self, short_token: &str, handle: &str) -> Self {
        self.handles
            .insert(short_token.to_string(), handle.to_string());
        self
    }

    /// Short-lived token → long-lived token.
    pub fn on_long_exchange(mut self, short_token: &str, long_token: &str, expires_in: i64) -> Self {
        self.long_tokens
            .insert(short_token.to_string(), (long_token.to_string(), expires_in));
        self
    }

    /// Old long-lived token → refreshed token. Tokens without an entry fail
    /// refresh the way upstream rejects too-fresh or expired tokens.
    pub fn on_refresh(mut self, old_token: &str, new_token: &str, expires_in: i64) -> Self {
        self.refreshes
            .insert(old_token.to_string(), (new_token.to_string(), expires_in));
        self
    }

    /// Media items listable/fetchable with an access token.
    pub fn on_media(mut self, access_token: &str, details: Vec<MediaDetail>) -> Self {
        self.media.insert(access_token.to_string(), details);
        self
    }

    /// Make one media id's detail fetch fail.
    pub fn with_failing_detail(mut self, media_id: &str) -> Self {
        self.failing_details.insert(media_id.to_string());
        self
    }

    /// Tokens a refresh was attempted for, in order.
    pub fn refresh_attempts(&self) -> Vec<String> {
        self.refresh_attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourcePlatform for MockSource {
    async fn exchange_code(&self, code: &str) -> instagram_client::Result<ShortLivedToken> {
        match self.codes.get(code) {
            Some(token) => Ok(ShortLivedToken {
                access_token: token.clone(),
                user_id: None,
                permissions: None,
            }),
            None => Err(InstagramError::InvalidCode(format!(
                "MockSource: unknown code {code}"
            ))),
        }
    }

    async fn fetch_handle(&self, access_token: &str) -> instagram_client::Result<String> {
        self.handles
            .get(access_token)
            .cloned()
            .ok_or_else(|| InstagramError::Api {
                status: 401,
                message: format!("MockSource: no handle for token {access_token}"),
            })
    }

    async fn exchange_long_lived(
        &self,
        short_token: &str,
    ) -> instagram_client::Result<LongLivedToken> {
        let (token, expires_in) =
            self.long_tokens
                .get(short_token)
                .ok_or_else(|| InstagramError::Api {
                    status: 400,
                    message: "MockSource: no long-lived exchange registered".to_string(),
                })?;
        Ok(LongLivedToken {
            access_token: token.clone(),
            token_type: "bearer".to_string(),
            expires_in: *expires_in,
        })
    }

    async fn refresh_long_lived(
        &self,
        access_token: &str,
    ) -> instagram_client::Result<LongLivedToken> {
        self.refresh_attempts
            .lock()
            .unwrap()
            .push(access_token.to_string());

        let (token, expires_in) =
            self.refreshes
                .get(access_token)
                .ok_or_else(|| InstagramError::Api {
                    status: 400,
                    message: "MockSource: token not eligible for refresh".to_string(),
                })?;
        Ok(LongLivedToken {
            access_token: token.clone(),
            token_type: "bearer".to_string(),
            expires_in: *expires_in,
        })
    }

    async fn list_media_ids(
        &self,
        access_token: &str,
        since: i64,
    ) -> instagram_client::Result<Vec<String>> {
        let details = self
            .media
            .get(access_token)
            .ok_or_else(|| InstagramError::Api {
                status: 401,
                message: format!("MockSource: no media for token {access_token}"),
            })?;
        Ok(details
            .iter()
            .filter(|d| d.timestamp.timestamp() >= since)
            .map(|d| d.id.clone())
            .collect())
    }

    async fn media_detail(
        &self,
        access_token: &str,
        media_id: &str,
    ) -> instagram_client::Result<MediaDetail> {
        if self.failing_details.contains(media_id) {
            return Err(InstagramError::Api {
                status: 500,
                message: format!("MockSource: detail fetch for {media_id} set to fail"),
            });
        }
        self.media
            .get(access_token)
            .and_then(|details| details.iter().find(|d| d.id == media_id))
            .cloned()
            .ok_or_else(|| InstagramError::Api {
                status: 404,
                message: format!("MockSource: no media {media_id}"),
            })
    }
}

// ---------------------------------------------------------------------------
// MockResolver
// ---------------------------------------------------------------------------

/// HashMap-based media URL resolution. Unregistered URLs fail permanently,
/// the way a dead redirect shim 404s.
#[derive(Default)]
pub struct MockResolver {
    urls: HashMap<String, String>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_url(mut self, media_url: &str, resolved: &str) -> Self {
        self.urls
            .insert(media_url.to_string(), resolved.to_string());
        self
    }
}

#[async_trait]
impl ImageResolver for MockResolver {
    async fn resolve(&self, media_url: &str) -> std::result::Result<String, ResolveError> {
        self.urls
            .get(media_url)
            .cloned()
            .ok_or(ResolveError::Permanent { status: 404 })
    }
}

// ---------------------------------------------------------------------------
// MockBatchBackend
// ---------------------------------------------------------------------------

/// Fake Batch API. Captures the uploaded payload and, when the output file
/// is fetched, echoes one output line per uploaded request using the
/// programmed per-post extraction results (all-null fields by default).
#[derive(Default)]
pub struct MockBatchBackend {
    responses: HashMap<Uuid, serde_json::Value>,
    statuses: Mutex<VecDeque<String>>,
    uploaded: Mutex<Option<String>>,
    deleted: Mutex<Vec<String>>,
    corrupt_output: bool,
}

impl MockBatchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extraction result (the inner structured JSON) for one post.
    pub fn respond_with(mut self, post_id: Uuid, fields: serde_json::Value) -> Self {
        self.responses.insert(post_id, fields);
        self
    }

    /// Statuses returned by successive `get_batch` calls; once exhausted,
    /// the batch reports `completed`.
    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        *self.statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Append a line that is not valid JSON to the output artifact.
    pub fn with_corrupt_output(mut self) -> Self {
        self.corrupt_output = true;
        self
    }

    /// The JSONL payload uploaded for the last run, if any.
    pub fn uploaded_payload(&self) -> Option<String> {
        self.uploaded.lock().unwrap().clone()
    }

    /// File ids deleted via `delete_file`.
    pub fn deleted_files(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn null_fields() -> serde_json::Value {
        json!({
            "title": null,
            "description": null,
            "startDatetime": null,
            "endDatetime": null,
            "location": null,
            "incentives": null,
        })
    }
}

#[async_trait]
impl ExtractionBackend for MockBatchBackend {
    async fn upload_batch_input(
        &self,
        _filename: &str,
        payload: Vec<u8>,
    ) -> openai_batch_client::Result<FileObject> {
        let text = String::from_utf8(payload).map_err(|e| BatchError::Parse(e.to_string()))?;
        *self.uploaded.lock().unwrap() = Some(text);
        Ok(FileObject {
            id: "file-input".to_string(),
            filename: Some("input.jsonl".to_string()),
            bytes: None,
        })
    }

    async fn create_batch(&self, input_file_id: &str) -> openai_batch_client::Result<Batch> {
        Ok(Batch {
            id: "batch-1".to_string(),
            status: "validating".to_string(),
            input_file_id: input_file_id.to_string(),
            output_file_id: None,
            error_file_id: None,
        })
    }

    async fn get_batch(&self, batch_id: &str) -> openai_batch_client::Result<Batch> {
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "completed".to_string());
        let output_file_id = (status == "completed").then(|| "file-output".to_string());
        Ok(Batch {
            id: batch_id.to_string(),
            status,
            input_file_id: "file-input".to_string(),
            output_file_id,
            error_file_id: None,
        })
    }

    async fn file_content(&self, file_id: &str) -> openai_batch_client::Result<String> {
        if file_id != "file-output" {
            return Err(BatchError::Api {
                status: 404,
                message: format!("MockBatchBackend: no file {file_id}"),
            });
        }

        let uploaded = self.uploaded.lock().unwrap().clone().ok_or(BatchError::Api {
            status: 409,
            message: "MockBatchBackend: nothing uploaded".to_string(),
        })?;

        let mut lines = Vec::new();
        for line in uploaded.lines() {
            let request: serde_json::Value =
                serde_json::from_str(line).map_err(|e| BatchError::Parse(e.to_string()))?;
            let custom_id = request["custom_id"].as_str().unwrap_or_default();
            let fields = Uuid::parse_str(custom_id)
                .ok()
                .and_then(|id| self.responses.get(&id).cloned())
                .unwrap_or_else(Self::null_fields);

            lines.push(
                json!({
                    "custom_id": custom_id,
                    "response": {
                        "body": {
                            "output": [ { "content": [ { "text": fields.to_string() } ] } ],
                        },
                    },
                })
                .to_string(),
            );
        }

        if self.corrupt_output {
            lines.push("{ this is not json".to_string());
        }

        Ok(lines.join("\n"))
    }

    async fn delete_file(&self, file_id: &str) -> openai_batch_client::Result<bool> {
        self.deleted.lock().unwrap().push(file_id.to_string());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// In-memory stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryOrganizationDirectory {
    organizations: Vec<Organization>,
}

impl MemoryOrganizationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(mut self, organization: Organization) -> Self {
        self.organizations.push(organization);
        self
    }
}

#[async_trait]
impl OrganizationDirectory for MemoryOrganizationDirectory {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<Organization>> {
        Ok(self
            .organizations
            .iter()
            .find(|o| o.instagram_handle.as_deref() == Some(handle))
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    rows: Mutex<HashMap<Uuid, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, organization_id: Uuid) -> Option<Credential> {
        self.rows.lock().unwrap().get(&organization_id).cloned()
    }

    pub fn seed(&self, credential: Credential) {
        self.rows
            .lock()
            .unwrap()
            .insert(credential.organization_id, credential);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn upsert(&self, credential: NewCredential) -> Result<()> {
        self.rows.lock().unwrap().insert(
            credential.organization_id,
            Credential {
                organization_id: credential.organization_id,
                instagram_handle: credential.instagram_handle,
                access_token: credential.access_token,
                expires_at: credential.expires_at,
            },
        );
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Credential>> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn expiring_within(&self, cutoff: DateTime<Utc>) -> Result<Vec<Credential>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.expires_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn update_token(
        &self,
        organization_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let Some(credential) = rows.get_mut(&organization_id) else {
            bail!("MemoryCredentialStore: no credential for {organization_id}");
        };
        credential.access_token = access_token.to_string();
        credential.expires_at = expires_at;
        Ok(())
    }

    async fn delete_for_organization(&self, organization_id: Uuid) -> Result<()> {
        self.rows.lock().unwrap().remove(&organization_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPostStore {
    rows: Mutex<Vec<Post>>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Post> {
        self.rows.lock().unwrap().clone()
    }

    pub fn get(&self, post_id: Uuid) -> Option<Post> {
        self.rows.lock().unwrap().iter().find(|p| p.id == post_id).cloned()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert_many(&self, posts: &[NewPost]) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut inserted = 0;
        for post in posts {
            if rows.iter().any(|p| p.source_url == post.source_url) {
                continue;
            }
            rows.push(Post {
                id: Uuid::new_v4(),
                organization_id: post.organization_id,
                source_url: post.source_url.clone(),
                media_url: post.media_url.clone(),
                caption: post.caption.clone(),
                created_on: post.created_on,
                status: post.status,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn with_status(&self, status: PostStatus) -> Result<Vec<Post>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }

    async fn pending_extraction(&self) -> Result<Vec<Post>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status != PostStatus::Processed)
            .cloned()
            .collect())
    }

    async fn advance_status(&self, post_id: Uuid, next: PostStatus) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let Some(post) = rows.iter_mut().find(|p| p.id == post_id) else {
            bail!("MemoryPostStore: no post {post_id}");
        };
        if !post.status.can_advance(next) {
            bail!(
                "MemoryPostStore: invalid transition {} → {} for {post_id}",
                post.status,
                next
            );
        }
        post.status = next;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEventStore {
    rows: Mutex<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Event> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_many(&self, events: &[NewEvent]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for event in events {
            rows.push(Event {
                id: Uuid::new_v4(),
                post_id: event.post_id,
                title: event.title.clone(),
                description: event.description.clone(),
                start_datetime: event.start_datetime,
                end_datetime: event.end_datetime,
                location: event.location.clone(),
                incentives: event.incentives.clone(),
            });
        }
        Ok(())
    }

    async fn find_by_post(&self, post_id: Uuid) -> Result<Vec<Event>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.post_id == post_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

/// A registered organization with a linked handle.
pub fn organization(name: &str, handle: &str) -> Organization {
    Organization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        instagram_handle: Some(handle.to_string()),
    }
}

/// A stored credential for an organization.
pub fn credential(
    organization_id: Uuid,
    handle: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Credential {
    Credential {
        organization_id,
        instagram_handle: handle.to_string(),
        access_token: token.to_string(),
        expires_at,
    }
}

/// A media item as the detail endpoint would return it.
pub fn media_detail(id: &str, caption: &str, permalink: &str, timestamp: DateTime<Utc>) -> MediaDetail {
    MediaDetail {
        id: id.to_string(),
        caption: Some(caption.to_string()),
        media_type: "IMAGE".to_string(),
        permalink: permalink.to_string(),
        timestamp,
    }
}
