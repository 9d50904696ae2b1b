use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstagramError>;

#[derive(Debug, Error)]
pub enum InstagramError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Instagram API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The authorization code was rejected by the code-exchange endpoint.
    /// Distinct from other 4xx responses so callers can tell a bad/expired
    /// code apart from a misconfigured client.
    #[error("Authorization code rejected: {0}")]
    InvalidCode(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for InstagramError {
    fn from(err: reqwest::Error) -> Self {
        InstagramError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for InstagramError {
    fn from(err: serde_json::Error) -> Self {
        InstagramError::Parse(err.to_string())
    }
}
