//! End-to-end pipeline tests against the in-memory doubles: token exchange
//! and refresh, ingestion, and the full extraction run.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use campusbeat_common::{NewPost, PostStatus};
use campusbeat_pipeline::testing::{
    credential, media_detail, organization, MemoryCredentialStore, MemoryEventStore,
    MemoryOrganizationDirectory, MemoryPostStore, MockBatchBackend, MockResolver, MockSource,
};
use campusbeat_pipeline::traits::{CredentialStore, EventStore, PostStore};
use campusbeat_pipeline::{
    BatchExtractor, ExchangeError, ExchangeOutcome, ExtractionRunError, PostIngestor,
    TokenLifecycle,
};

async fn seed_post(posts: &Arc<MemoryPostStore>, caption: &str) -> Uuid {
    let new_post = NewPost {
        organization_id: Uuid::new_v4(),
        source_url: "https://www.instagram.com/p/board-games/".to_string(),
        media_url: "https://www.instagram.com/p/board-games/media".to_string(),
        caption: Some(caption.to_string()),
        created_on: Utc::now(),
        status: PostStatus::Unprocessed,
    };
    posts.insert_many(&[new_post]).await.unwrap();
    posts.all()[0].id
}

// --- token exchange ---

#[tokio::test]
async fn exchange_stores_credential_for_registered_organization() {
    let org = organization("Chess Club", "campus_chess");
    let source = Arc::new(
        MockSource::new()
            .on_code("auth-code", "short-token")
            .on_handle("short-token", "campus_chess")
            .on_long_exchange("short-token", "long-token", 60 * 24 * 60 * 60),
    );
    let directory = Arc::new(MemoryOrganizationDirectory::new().with_organization(org.clone()));
    let credentials = Arc::new(MemoryCredentialStore::new());

    let lifecycle = TokenLifecycle::new(source, directory, credentials.clone());
    let outcome = lifecycle.exchange("auth-code").await.unwrap();

    match outcome {
        ExchangeOutcome::Registered {
            organization_id,
            handle,
        } => {
            assert_eq!(organization_id, org.id);
            assert_eq!(handle, "campus_chess");
        }
        other => panic!("expected Registered, got {other:?}"),
    }

    let stored = credentials.get(org.id).unwrap();
    assert_eq!(stored.access_token, "long-token");
    assert_eq!(stored.instagram_handle, "campus_chess");
    assert!(stored.expires_at > Utc::now() + Duration::days(59));
}

#[tokio::test]
async fn exchange_for_unknown_handle_is_not_registered() {
    let source = Arc::new(
        MockSource::new()
            .on_code("auth-code", "short-token")
            .on_handle("short-token", "random_account"),
    );
    let directory = Arc::new(MemoryOrganizationDirectory::new());
    let credentials = Arc::new(MemoryCredentialStore::new());

    let lifecycle = TokenLifecycle::new(source, directory, credentials.clone());
    let outcome = lifecycle.exchange("auth-code").await.unwrap();

    match outcome {
        ExchangeOutcome::NotRegistered { handle } => assert_eq!(handle, "random_account"),
        other => panic!("expected NotRegistered, got {other:?}"),
    }
    assert!(credentials.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn exchange_rejects_bad_code() {
    let source = Arc::new(MockSource::new());
    let directory = Arc::new(MemoryOrganizationDirectory::new());
    let credentials = Arc::new(MemoryCredentialStore::new());

    let lifecycle = TokenLifecycle::new(source, directory, credentials);
    let err = lifecycle.exchange("bogus").await.unwrap_err();
    assert!(matches!(err, ExchangeError::InvalidCode(_)));
}

// --- token refresh ---

#[tokio::test]
async fn refresh_touches_only_credentials_within_horizon() {
    let now = Utc::now();
    let near = organization("Near Expiry", "near_org");
    let far = organization("Far Expiry", "far_org");

    let source = Arc::new(
        MockSource::new()
            .on_refresh("near-token", "near-token-v2", 60 * 24 * 60 * 60)
            .on_refresh("far-token", "far-token-v2", 60 * 24 * 60 * 60),
    );
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.seed(credential(near.id, "near_org", "near-token", now + Duration::days(5)));
    credentials.seed(credential(far.id, "far_org", "far-token", now + Duration::days(30)));

    let directory = Arc::new(MemoryOrganizationDirectory::new());
    let lifecycle = TokenLifecycle::new(source.clone(), directory, credentials.clone());

    let refreshed = lifecycle.refresh_expiring(now, 10).await.unwrap();

    assert_eq!(refreshed, 1);
    assert_eq!(source.refresh_attempts(), vec!["near-token".to_string()]);

    let near_cred = credentials.get(near.id).unwrap();
    assert_eq!(near_cred.access_token, "near-token-v2");
    assert_eq!(near_cred.expires_at, now + Duration::seconds(60 * 24 * 60 * 60));

    let far_cred = credentials.get(far.id).unwrap();
    assert_eq!(far_cred.access_token, "far-token");
}

#[tokio::test]
async fn failed_refresh_keeps_prior_token() {
    let now = Utc::now();
    let org = organization("Stale", "stale_org");

    // No refresh programmed for this token: upstream rejects it.
    let source = Arc::new(MockSource::new());
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.seed(credential(org.id, "stale_org", "stale-token", now + Duration::days(2)));

    let directory = Arc::new(MemoryOrganizationDirectory::new());
    let lifecycle = TokenLifecycle::new(source, directory, credentials.clone());

    let refreshed = lifecycle.refresh_expiring(now, 10).await.unwrap();

    assert_eq!(refreshed, 0);
    assert_eq!(credentials.get(org.id).unwrap().access_token, "stale-token");
}

// --- ingestion ---

#[tokio::test]
async fn ingest_twice_inserts_each_post_once() {
    let now = Utc::now();
    let org = organization("Board Games", "board_games");

    let source = Arc::new(MockSource::new().on_media(
        "bg-token",
        vec![media_detail(
            "media-1",
            "Board games Friday 7pm @ Wilson Hall WI2002, free pizza!",
            "https://www.instagram.com/p/bg1/",
            now - Duration::hours(2),
        )],
    ));
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.seed(credential(org.id, "board_games", "bg-token", now + Duration::days(30)));
    let posts = Arc::new(MemoryPostStore::new());

    let ingestor = PostIngestor::new(source, credentials, posts.clone(), 24);

    let first = ingestor.ingest_all(now).await.unwrap();
    assert_eq!(first.posts_found, 1);
    assert_eq!(first.posts_inserted, 1);

    let second = ingestor.ingest_all(now).await.unwrap();
    assert_eq!(second.posts_found, 1);
    assert_eq!(second.posts_inserted, 0);

    let unprocessed = posts.with_status(PostStatus::Unprocessed).await.unwrap();
    assert_eq!(unprocessed.len(), 1);
    assert_eq!(unprocessed[0].source_url, "https://www.instagram.com/p/bg1/");
    assert_eq!(unprocessed[0].media_url, "https://www.instagram.com/p/bg1/media");
}

#[tokio::test]
async fn ingest_skips_media_outside_window() {
    let now = Utc::now();
    let org = organization("Quiet Club", "quiet_club");

    let source = Arc::new(MockSource::new().on_media(
        "qc-token",
        vec![media_detail(
            "media-old",
            "Throwback to last month",
            "https://www.instagram.com/p/old/",
            now - Duration::hours(30),
        )],
    ));
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.seed(credential(org.id, "quiet_club", "qc-token", now + Duration::days(30)));
    let posts = Arc::new(MemoryPostStore::new());

    let ingestor = PostIngestor::new(source, credentials, posts.clone(), 24);
    let stats = ingestor.ingest_all(now).await.unwrap();

    assert_eq!(stats.posts_found, 0);
    assert!(posts.all().is_empty());
}

#[tokio::test]
async fn one_bad_credential_does_not_block_the_rest() {
    let now = Utc::now();
    let good = organization("Good Org", "good_org");
    let bad = organization("Bad Org", "bad_org");

    // Only good_org's token is known to the source; bad_org's listing 401s.
    let source = Arc::new(MockSource::new().on_media(
        "good-token",
        vec![media_detail(
            "media-1",
            "Open mic tonight at the student center lounge",
            "https://www.instagram.com/p/mic/",
            now - Duration::hours(1),
        )],
    ));
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.seed(credential(good.id, "good_org", "good-token", now + Duration::days(30)));
    credentials.seed(credential(bad.id, "bad_org", "revoked-token", now + Duration::days(30)));
    let posts = Arc::new(MemoryPostStore::new());

    let ingestor = PostIngestor::new(source, credentials, posts.clone(), 24);
    let stats = ingestor.ingest_all(now).await.unwrap();

    assert_eq!(stats.organizations, 2);
    assert_eq!(stats.organizations_failed, 1);
    assert_eq!(posts.all().len(), 1);
}

#[tokio::test]
async fn failed_detail_fetch_drops_only_that_item() {
    let now = Utc::now();
    let org = organization("Two Posts", "two_posts");

    let source = Arc::new(
        MockSource::new()
            .on_media(
                "tp-token",
                vec![
                    media_detail(
                        "media-ok",
                        "Karaoke night this Saturday, prizes for the brave",
                        "https://www.instagram.com/p/ok/",
                        now - Duration::hours(1),
                    ),
                    media_detail(
                        "media-broken",
                        "unused",
                        "https://www.instagram.com/p/broken/",
                        now - Duration::hours(2),
                    ),
                ],
            )
            .with_failing_detail("media-broken"),
    );
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.seed(credential(org.id, "two_posts", "tp-token", now + Duration::days(30)));
    let posts = Arc::new(MemoryPostStore::new());

    let ingestor = PostIngestor::new(source, credentials, posts.clone(), 24);
    let stats = ingestor.ingest_all(now).await.unwrap();

    assert_eq!(stats.posts_found, 1);
    assert_eq!(posts.all().len(), 1);
    assert_eq!(posts.all()[0].source_url, "https://www.instagram.com/p/ok/");
}

// --- extraction ---

#[tokio::test]
async fn extraction_turns_post_into_event() {
    let posts = Arc::new(MemoryPostStore::new());
    let post_id = seed_post(&posts, "Board games Friday 7pm @ Wilson Hall WI2002, free pizza!").await;

    let resolver = Arc::new(MockResolver::new().on_url(
        "https://www.instagram.com/p/board-games/media",
        "https://cdn.example/board-games.jpg",
    ));
    let backend = Arc::new(MockBatchBackend::new().respond_with(
        post_id,
        json!({
            "title": "Board Games Night",
            "description": "Weekly board games social, everyone welcome",
            "startDatetime": "2025-05-22T19:00:00Z",
            "endDatetime": null,
            "location": "Wilson Hall WI2002",
            "incentives": "free pizza",
        }),
    ));
    let events = Arc::new(MemoryEventStore::new());

    let extractor = BatchExtractor::new(
        resolver,
        backend.clone(),
        posts.clone(),
        events.clone(),
        "gpt-4o-mini",
    )
    .with_poll_interval(StdDuration::from_millis(1));

    let stats = extractor.run().await.unwrap();

    assert_eq!(stats.posts_processed, 1);
    assert_eq!(stats.events_created, 1);
    assert_eq!(posts.get(post_id).unwrap().status, PostStatus::Processed);

    let stored = events.find_by_post(post_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].post_id, post_id);
    assert_eq!(stored[0].title, "Board Games Night");
    assert_eq!(stored[0].location, "Wilson Hall WI2002");
    assert_eq!(stored[0].incentives.as_deref(), Some("free pizza"));
    // 19:00 Eastern wall clock in May is EDT (UTC-4).
    assert_eq!(stored[0].start_datetime.to_rfc3339(), "2025-05-22T23:00:00+00:00");

    // The resolved image travelled with the request.
    let payload = backend.uploaded_payload().unwrap();
    assert!(payload.contains("https://cdn.example/board-games.jpg"));
    // Input file cleanup happened.
    assert_eq!(backend.deleted_files(), vec!["file-input".to_string()]);
}

#[tokio::test]
async fn non_event_post_completes_without_an_event() {
    let posts = Arc::new(MemoryPostStore::new());
    let post_id = seed_post(&posts, "Great turnout at last week's tournament, thanks all!").await;

    // No resolver mapping: the request goes out caption-only. No programmed
    // response: the backend answers with all-null fields.
    let resolver = Arc::new(MockResolver::new());
    let backend = Arc::new(MockBatchBackend::new());
    let events = Arc::new(MemoryEventStore::new());

    let extractor = BatchExtractor::new(
        resolver,
        backend.clone(),
        posts.clone(),
        events.clone(),
        "gpt-4o-mini",
    )
    .with_poll_interval(StdDuration::from_millis(1));

    let stats = extractor.run().await.unwrap();

    assert_eq!(stats.posts_processed, 1);
    assert_eq!(stats.events_created, 0);
    assert!(events.all().is_empty());
    assert_eq!(posts.get(post_id).unwrap().status, PostStatus::Processed);

    let payload = backend.uploaded_payload().unwrap();
    assert!(!payload.contains("input_image"));
}

#[tokio::test]
async fn malformed_output_fails_run_and_next_run_reclaims_posts() {
    let posts = Arc::new(MemoryPostStore::new());
    let post_id = seed_post(&posts, "Movie night Thursday 8pm in the main auditorium").await;

    let events = Arc::new(MemoryEventStore::new());
    let resolver = Arc::new(MockResolver::new());

    let corrupt_backend = Arc::new(MockBatchBackend::new().with_corrupt_output());
    let extractor = BatchExtractor::new(
        resolver.clone(),
        corrupt_backend,
        posts.clone(),
        events.clone(),
        "gpt-4o-mini",
    )
    .with_poll_interval(StdDuration::from_millis(1));

    let err = extractor.run().await.unwrap_err();
    assert!(matches!(err, ExtractionRunError::MalformedOutput { .. }));

    // The post stays pre-terminal and no events were written.
    assert_eq!(posts.get(post_id).unwrap().status, PostStatus::Processing);
    assert!(events.all().is_empty());

    // A later run with healthy output picks the post back up.
    let healthy_backend = Arc::new(MockBatchBackend::new());
    let retry = BatchExtractor::new(
        resolver,
        healthy_backend,
        posts.clone(),
        events,
        "gpt-4o-mini",
    )
    .with_poll_interval(StdDuration::from_millis(1));

    let stats = retry.run().await.unwrap();
    assert_eq!(stats.posts_processed, 1);
    assert_eq!(posts.get(post_id).unwrap().status, PostStatus::Processed);
}

#[tokio::test]
async fn polling_past_the_deadline_abandons_the_run() {
    let posts = Arc::new(MemoryPostStore::new());
    let post_id = seed_post(&posts, "Bake sale next Tuesday outside the library").await;

    let resolver = Arc::new(MockResolver::new());
    let backend = Arc::new(MockBatchBackend::new().with_statuses(&["in_progress", "in_progress"]));
    let events = Arc::new(MemoryEventStore::new());

    let extractor = BatchExtractor::new(resolver, backend, posts.clone(), events, "gpt-4o-mini")
        .with_poll_interval(StdDuration::from_millis(1))
        .with_poll_deadline(StdDuration::ZERO);

    let err = extractor.run().await.unwrap_err();
    assert!(matches!(err, ExtractionRunError::Abandoned { .. }));

    // Abandoned posts stay reclaimable.
    assert_eq!(posts.get(post_id).unwrap().status, PostStatus::Processing);
}

#[tokio::test]
async fn ingest_then_extract_full_pipeline() {
    let now = Utc::now();
    let org = organization("Board Games", "board_games");

    let source = Arc::new(MockSource::new().on_media(
        "bg-token",
        vec![media_detail(
            "media-1",
            "Board games Friday 7pm @ Wilson Hall WI2002, free pizza!",
            "https://www.instagram.com/p/bg1/",
            now - Duration::hours(2),
        )],
    ));
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.seed(credential(org.id, "board_games", "bg-token", now + Duration::days(30)));
    let posts = Arc::new(MemoryPostStore::new());

    let ingestor = PostIngestor::new(source, credentials, posts.clone(), 24);
    ingestor.ingest_all(now).await.unwrap();

    let post = posts.all().pop().unwrap();
    assert_eq!(post.status, PostStatus::Unprocessed);

    let resolver = Arc::new(MockResolver::new().on_url(
        "https://www.instagram.com/p/bg1/media",
        "https://cdn.example/bg1.jpg",
    ));
    let backend = Arc::new(MockBatchBackend::new().respond_with(
        post.id,
        json!({
            "title": "Board Games Night",
            "description": "Weekly board games social, everyone welcome",
            "startDatetime": "2025-05-23T19:00:00Z",
            "endDatetime": null,
            "location": "Wilson Hall WI2002",
            "incentives": "free pizza",
        }),
    ));
    let events = Arc::new(MemoryEventStore::new());

    let extractor = BatchExtractor::new(resolver, backend, posts.clone(), events.clone(), "gpt-4o-mini")
        .with_poll_interval(StdDuration::from_millis(1));
    extractor.run().await.unwrap();

    assert_eq!(posts.get(post.id).unwrap().status, PostStatus::Processed);

    let stored = events.find_by_post(post.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].location, "Wilson Hall WI2002");
    assert!(stored[0].incentives.as_deref().unwrap().contains("pizza"));
    assert_eq!(stored[0].start_datetime.to_rfc3339(), "2025-05-23T23:00:00+00:00");
}

#[tokio::test]
async fn extraction_with_nothing_pending_is_a_noop() {
    let posts = Arc::new(MemoryPostStore::new());
    let resolver = Arc::new(MockResolver::new());
    let backend = Arc::new(MockBatchBackend::new());
    let events = Arc::new(MemoryEventStore::new());

    let extractor =
        BatchExtractor::new(resolver, backend.clone(), posts, events, "gpt-4o-mini");
    let stats = extractor.run().await.unwrap();

    assert_eq!(stats.posts_processed, 0);
    assert_eq!(stats.events_created, 0);
    assert!(backend.uploaded_payload().is_none());
}
