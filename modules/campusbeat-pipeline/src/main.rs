use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use campusbeat_common::Config;
use campusbeat_pipeline::{
    BatchExtractor, ExchangeOutcome, PostIngestor, TokenLifecycle,
};
use campusbeat_store::{
    PgCredentialStore, PgEventStore, PgOrganizationStore, PgPostStore,
};
use instagram_client::{InstagramClient, MediaResolver};
use openai_batch_client::OpenAiBatchClient;

#[derive(Parser)]
#[command(name = "campusbeat")]
#[command(about = "CampusBeat event discovery pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exchange an Instagram authorization code for a stored credential
    Exchange {
        /// Authorization code from the OAuth redirect
        #[arg(long)]
        code: String,
    },

    /// Refresh long-lived tokens nearing expiry
    RefreshTokens,

    /// Pull recent posts for every connected organization
    Ingest,

    /// Run one extraction batch over pending posts
    Extract,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("campusbeat=info".parse()?))
        .init();

    let cli = Cli::parse();

    info!("CampusBeat pipeline starting...");

    let config = Config::from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    campusbeat_store::migrate(&pool).await?;

    let source = Arc::new(InstagramClient::new(
        config.instagram_client_id.clone(),
        config.instagram_client_secret.clone(),
        config.instagram_redirect_uri.clone(),
    ));
    let organizations = Arc::new(PgOrganizationStore::new(pool.clone()));
    let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
    let posts = Arc::new(PgPostStore::new(pool.clone()));
    let events = Arc::new(PgEventStore::new(pool.clone()));

    match cli.command {
        Command::Exchange { code } => {
            let lifecycle = TokenLifecycle::new(source, organizations, credentials);
            match lifecycle.exchange(&code).await? {
                ExchangeOutcome::Registered {
                    organization_id,
                    handle,
                } => {
                    println!("Connected @{handle} (organization {organization_id})");
                }
                ExchangeOutcome::NotRegistered { handle } => {
                    println!(
                        "@{handle} authorized us, but no organization is registered \
                         under that handle. Register the organization first, then retry."
                    );
                }
            }
        }

        Command::RefreshTokens => {
            let lifecycle = TokenLifecycle::new(source, organizations, credentials);
            let refreshed = lifecycle
                .refresh_expiring(Utc::now(), config.refresh_horizon_days)
                .await?;
            println!("Refreshed {refreshed} credential(s)");
        }

        Command::Ingest => {
            let ingestor = PostIngestor::new(source, credentials, posts, config.ingest_window_hours);
            let stats = ingestor.ingest_all(Utc::now()).await?;
            println!(
                "Ingested {} post(s) from {} organization(s) ({} failed)",
                stats.posts_inserted, stats.organizations, stats.organizations_failed
            );
        }

        Command::Extract => {
            let resolver = Arc::new(MediaResolver::new());
            let backend = Arc::new(OpenAiBatchClient::new(config.openai_api_key.clone()));
            let extractor = BatchExtractor::new(
                resolver,
                backend,
                posts,
                events,
                config.extraction_model.clone(),
            )
            .with_poll_interval(Duration::from_secs(config.batch_poll_interval_secs))
            .with_poll_deadline(Duration::from_secs(config.batch_poll_deadline_secs));

            let stats = extractor.run().await?;
            println!(
                "Processed {} post(s), created {} event(s)",
                stats.posts_processed, stats.events_created
            );
        }
    }

    Ok(())
}
