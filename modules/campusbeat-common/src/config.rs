use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Instagram Graph API
    pub instagram_client_id: String,
    pub instagram_client_secret: String,
    pub instagram_redirect_uri: String,

    // OpenAI
    pub openai_api_key: String,
    pub extraction_model: String,

    // Pipeline tunables
    pub ingest_window_hours: u32,
    pub refresh_horizon_days: u32,
    pub batch_poll_interval_secs: u64,
    pub batch_poll_deadline_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            instagram_client_id: required_env("INSTAGRAM_CLIENT_ID"),
            instagram_client_secret: required_env("INSTAGRAM_CLIENT_SECRET"),
            instagram_redirect_uri: required_env("INSTAGRAM_REDIRECT_URI"),
            openai_api_key: required_env("OPENAI_API_KEY"),
            extraction_model: env::var("EXTRACTION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ingest_window_hours: parsed_env("INGEST_WINDOW_HOURS", 24),
            refresh_horizon_days: parsed_env("REFRESH_HORIZON_DAYS", 10),
            batch_poll_interval_secs: parsed_env("BATCH_POLL_INTERVAL_SECS", 30),
            // Batch jobs are provisioned for a 24h completion window; leave
            // some slack before a run is abandoned.
            batch_poll_deadline_secs: parsed_env("BATCH_POLL_DEADLINE_SECS", 26 * 60 * 60),
        }
    }

    /// Log the non-secret parts of the config at startup.
    pub fn log_redacted(&self) {
        info!(
            extraction_model = %self.extraction_model,
            ingest_window_hours = self.ingest_window_hours,
            refresh_horizon_days = self.refresh_horizon_days,
            batch_poll_interval_secs = self.batch_poll_interval_secs,
            batch_poll_deadline_secs = self.batch_poll_deadline_secs,
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Debug,
{
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a number: {e:?}")),
        Err(_) => default,
    }
}
