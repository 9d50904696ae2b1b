// Trait abstractions for pipeline dependencies.
//
// SourcePlatform — the Instagram Graph API surface the pipeline consumes.
// ImageResolver — redirect-shim resolution for media URLs.
// ExtractionBackend — the OpenAI Batch API surface.
// CredentialStore / OrganizationDirectory / PostStore / EventStore — the
//   persisted state surfaces.
//
// These enable deterministic testing with the in-memory doubles in
// `testing`: no network, no database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use anyhow::Result;
use campusbeat_common::{Credential, Event, NewCredential, NewEvent, NewPost, Organization, Post, PostStatus};
use instagram_client::resolve::ResolveError;
use instagram_client::types::{LongLivedToken, MediaDetail, ShortLivedToken};
use openai_batch_client::types::{Batch, FileObject};

// ---------------------------------------------------------------------------
// Upstream: Instagram
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SourcePlatform: Send + Sync {
    /// Exchange an authorization code for a short-lived token.
    async fn exchange_code(&self, code: &str) -> instagram_client::Result<ShortLivedToken>;

    /// Account handle for a token.
    async fn fetch_handle(&self, access_token: &str) -> instagram_client::Result<String>;

    /// Short-lived → long-lived token exchange.
    async fn exchange_long_lived(
        &self,
        short_token: &str,
    ) -> instagram_client::Result<LongLivedToken>;

    /// Refresh an unexpired long-lived token.
    async fn refresh_long_lived(
        &self,
        access_token: &str,
    ) -> instagram_client::Result<LongLivedToken>;

    /// Ids of media items created at or after `since` (unix seconds).
    async fn list_media_ids(
        &self,
        access_token: &str,
        since: i64,
    ) -> instagram_client::Result<Vec<String>>;

    /// Full detail for one media id.
    async fn media_detail(
        &self,
        access_token: &str,
        media_id: &str,
    ) -> instagram_client::Result<MediaDetail>;
}

#[async_trait]
impl SourcePlatform for instagram_client::InstagramClient {
    async fn exchange_code(&self, code: &str) -> instagram_client::Result<ShortLivedToken> {
        self.exchange_code(code).await
    }

    async fn fetch_handle(&self, access_token: &str) -> instagram_client::Result<String> {
        self.fetch_handle(access_token).await
    }

    async fn exchange_long_lived(
        &self,
        short_token: &str,
    ) -> instagram_client::Result<LongLivedToken> {
        self.exchange_long_lived(short_token).await
    }

    async fn refresh_long_lived(
        &self,
        access_token: &str,
    ) -> instagram_client::Result<LongLivedToken> {
        self.refresh_long_lived(access_token).await
    }

    async fn list_media_ids(
        &self,
        access_token: &str,
        since: i64,
    ) -> instagram_client::Result<Vec<String>> {
        self.list_media_ids(access_token, since).await
    }

    async fn media_detail(
        &self,
        access_token: &str,
        media_id: &str,
    ) -> instagram_client::Result<MediaDetail> {
        self.media_detail(access_token, media_id).await
    }
}

// ---------------------------------------------------------------------------
// Media resolution
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Follow the redirect shim to a stable, fetchable URL.
    async fn resolve(&self, media_url: &str) -> std::result::Result<String, ResolveError>;
}

#[async_trait]
impl ImageResolver for instagram_client::MediaResolver {
    async fn resolve(&self, media_url: &str) -> std::result::Result<String, ResolveError> {
        self.resolve(media_url).await
    }
}

// ---------------------------------------------------------------------------
// Upstream: OpenAI Batch
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn upload_batch_input(
        &self,
        filename: &str,
        payload: Vec<u8>,
    ) -> openai_batch_client::Result<FileObject>;

    async fn create_batch(&self, input_file_id: &str) -> openai_batch_client::Result<Batch>;

    async fn get_batch(&self, batch_id: &str) -> openai_batch_client::Result<Batch>;

    async fn file_content(&self, file_id: &str) -> openai_batch_client::Result<String>;

    async fn delete_file(&self, file_id: &str) -> openai_batch_client::Result<bool>;
}

#[async_trait]
impl ExtractionBackend for openai_batch_client::OpenAiBatchClient {
    async fn upload_batch_input(
        &self,
        filename: &str,
        payload: Vec<u8>,
    ) -> openai_batch_client::Result<FileObject> {
        self.upload_batch_input(filename, payload).await
    }

    async fn create_batch(&self, input_file_id: &str) -> openai_batch_client::Result<Batch> {
        self.create_batch(input_file_id).await
    }

    async fn get_batch(&self, batch_id: &str) -> openai_batch_client::Result<Batch> {
        self.get_batch(batch_id).await
    }

    async fn file_content(&self, file_id: &str) -> openai_batch_client::Result<String> {
        self.file_content(file_id).await
    }

    async fn delete_file(&self, file_id: &str) -> openai_batch_client::Result<bool> {
        self.delete_file(file_id).await
    }
}

// ---------------------------------------------------------------------------
// Persisted state surfaces
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<Organization>>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn upsert(&self, credential: NewCredential) -> Result<()>;
    async fn all(&self) -> Result<Vec<Credential>>;
    async fn expiring_within(&self, cutoff: DateTime<Utc>) -> Result<Vec<Credential>>;
    async fn update_token(
        &self,
        organization_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn delete_for_organization(&self, organization_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert posts, skipping duplicate source URLs. Returns the count
    /// actually inserted.
    async fn insert_many(&self, posts: &[NewPost]) -> Result<u64>;
    async fn with_status(&self, status: PostStatus) -> Result<Vec<Post>>;
    /// Posts awaiting extraction (`unprocessed` plus reclaimed `processing`).
    async fn pending_extraction(&self) -> Result<Vec<Post>>;
    /// Guarded forward-only status transition.
    async fn advance_status(&self, post_id: Uuid, next: PostStatus) -> Result<()>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_many(&self, events: &[NewEvent]) -> Result<()>;
    async fn find_by_post(&self, post_id: Uuid) -> Result<Vec<Event>>;
}

// --- Postgres implementations ---

#[async_trait]
impl OrganizationDirectory for campusbeat_store::PgOrganizationStore {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<Organization>> {
        Ok(self.find_by_handle(handle).await?)
    }
}

#[async_trait]
impl CredentialStore for campusbeat_store::PgCredentialStore {
    async fn upsert(&self, credential: NewCredential) -> Result<()> {
        Ok(self.upsert(credential).await?)
    }

    async fn all(&self) -> Result<Vec<Credential>> {
        Ok(self.all().await?)
    }

    async fn expiring_within(&self, cutoff: DateTime<Utc>) -> Result<Vec<Credential>> {
        Ok(self.expiring_within(cutoff).await?)
    }

    async fn update_token(
        &self,
        organization_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(self
            .update_token(organization_id, access_token, expires_at)
            .await?)
    }

    async fn delete_for_organization(&self, organization_id: Uuid) -> Result<()> {
        Ok(self.delete_for_organization(organization_id).await?)
    }
}

#[async_trait]
impl PostStore for campusbeat_store::PgPostStore {
    async fn insert_many(&self, posts: &[NewPost]) -> Result<u64> {
        Ok(self.insert_many(posts).await?)
    }

    async fn with_status(&self, status: PostStatus) -> Result<Vec<Post>> {
        Ok(self.with_status(status).await?)
    }

    async fn pending_extraction(&self) -> Result<Vec<Post>> {
        Ok(self.pending_extraction().await?)
    }

    async fn advance_status(&self, post_id: Uuid, next: PostStatus) -> Result<()> {
        Ok(self.advance_status(post_id, next).await?)
    }
}

#[async_trait]
impl EventStore for campusbeat_store::PgEventStore {
    async fn insert_many(&self, events: &[NewEvent]) -> Result<()> {
        Ok(self.insert_many(events).await?)
    }

    async fn find_by_post(&self, post_id: Uuid) -> Result<Vec<Event>> {
        Ok(self.find_by_post(post_id).await?)
    }
}
