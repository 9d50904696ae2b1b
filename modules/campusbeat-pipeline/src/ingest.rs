//! Post ingestion: pull recent media for every stored credential and land it
//! in the post store as `unprocessed`.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{info, warn};

use campusbeat_common::{Credential, NewPost, PostStatus};
use instagram_client::media_url_from_permalink;

use crate::traits::{CredentialStore, PostStore, SourcePlatform};

/// What one ingestion run did, for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub organizations: usize,
    pub organizations_failed: usize,
    pub posts_found: usize,
    pub posts_inserted: u64,
}

pub struct PostIngestor {
    source: Arc<dyn SourcePlatform>,
    credentials: Arc<dyn CredentialStore>,
    posts: Arc<dyn PostStore>,
    /// Trailing window for the source-side `since` filter.
    window_hours: u32,
}

impl PostIngestor {
    pub fn new(
        source: Arc<dyn SourcePlatform>,
        credentials: Arc<dyn CredentialStore>,
        posts: Arc<dyn PostStore>,
        window_hours: u32,
    ) -> Self {
        Self {
            source,
            credentials,
            posts,
            window_hours,
        }
    }

    /// Ingest recent posts for every stored credential. Failures are
    /// isolated per organization: one bad credential is logged and skipped,
    /// the loop proceeds.
    pub async fn ingest_all(&self, now: DateTime<Utc>) -> Result<IngestStats> {
        let credentials = self.credentials.all().await?;
        let mut stats = IngestStats {
            organizations: credentials.len(),
            ..Default::default()
        };

        for credential in credentials {
            match self.ingest_one(&credential, now).await {
                Ok((found, inserted)) => {
                    stats.posts_found += found;
                    stats.posts_inserted += inserted;
                }
                Err(e) => {
                    warn!(
                        organization_id = %credential.organization_id,
                        handle = %credential.instagram_handle,
                        error = %e,
                        "Ingestion failed for organization, continuing with the rest"
                    );
                    stats.organizations_failed += 1;
                }
            }
        }

        info!(
            organizations = stats.organizations,
            failed = stats.organizations_failed,
            found = stats.posts_found,
            inserted = stats.posts_inserted,
            "Ingestion run complete"
        );

        Ok(stats)
    }

    async fn ingest_one(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<(usize, u64)> {
        let since = (now - Duration::hours(self.window_hours as i64)).timestamp();
        let media_ids = self
            .source
            .list_media_ids(&credential.access_token, since)
            .await?;

        if media_ids.is_empty() {
            info!(handle = %credential.instagram_handle, "No new media in window");
            return Ok((0, 0));
        }

        // Details fan out concurrently; one failed fetch drops that item
        // only, never the batch.
        let fetches = media_ids
            .iter()
            .map(|id| self.source.media_detail(&credential.access_token, id));
        let details = join_all(fetches).await;

        let mut new_posts = Vec::with_capacity(media_ids.len());
        for (media_id, detail) in media_ids.iter().zip(details) {
            match detail {
                Ok(d) => new_posts.push(NewPost {
                    organization_id: credential.organization_id,
                    media_url: media_url_from_permalink(&d.permalink),
                    source_url: d.permalink,
                    caption: d.caption,
                    created_on: d.timestamp,
                    status: PostStatus::Unprocessed,
                }),
                Err(e) => {
                    warn!(
                        media_id = %media_id,
                        handle = %credential.instagram_handle,
                        error = %e,
                        "Failed to fetch media detail, dropping item"
                    );
                }
            }
        }

        let found = new_posts.len();
        let inserted = self.posts.insert_many(&new_posts).await?;

        info!(
            handle = %credential.instagram_handle,
            found,
            inserted,
            "Saved posts for organization"
        );

        Ok((found, inserted))
    }
}
