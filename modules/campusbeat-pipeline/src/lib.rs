//! The CampusBeat ingestion and extraction pipeline.
//!
//! Three scheduled entry points, run as independent batch jobs:
//! - [`tokens::TokenLifecycle::refresh_expiring`] keeps long-lived Instagram
//!   credentials alive,
//! - [`ingest::PostIngestor::ingest_all`] pulls recent posts for every
//!   stored credential,
//! - [`extract::BatchExtractor::run`] packages unprocessed posts into one
//!   OpenAI Batch job and persists the events it finds.
//!
//! All external dependencies sit behind the traits in [`traits`], so every
//! path is testable against the in-memory doubles in [`testing`].

pub mod extract;
pub mod ingest;
pub mod normalize;
pub mod tokens;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use extract::{BatchExtractor, ExtractionRunError, RunStats};
pub use ingest::{IngestStats, PostIngestor};
pub use tokens::{ExchangeError, ExchangeOutcome, TokenLifecycle};
