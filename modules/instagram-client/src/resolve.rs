// Media URL resolution. Instagram permalink `/media` URLs are redirect shims
// to a CDN; resolving means following the redirect chain and keeping the
// terminal URL.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

/// Max attempts per URL (first try included).
const MAX_ATTEMPTS: u32 = 3;
/// Per-attempt request timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);
/// Base backoff duration. Actual delay is base * 2^attempt + jitter, capped.
const BACKOFF_BASE: Duration = Duration::from_millis(300);
/// Backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Why a media URL could not be resolved. Callers building an extraction
/// batch treat any of these as "skip image enrichment for this post" — a
/// failed resolution never aborts the batch.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("Permanent upstream failure (status {status})")]
    Permanent { status: u16 },
}

/// Resolves redirect-style media URLs to stable CDN URLs with bounded
/// retries. Transient failures (transport errors, timeouts, 408/429/5xx)
/// back off and retry; anything else fails immediately.
pub struct MediaResolver {
    client: reqwest::Client,
}

impl MediaResolver {
    /// Panics if the HTTP client cannot be built; a resolver without its
    /// per-attempt timeout and bounded redirect policy must not run.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("resolver HTTP client");
        Self { client }
    }

    /// Follow redirects and return the terminal URL.
    pub async fn resolve(&self, media_url: &str) -> Result<String, ResolveError> {
        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            match self.client.get(media_url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.url().to_string());
                    }
                    if !is_retryable(status) {
                        return Err(ResolveError::Permanent {
                            status: status.as_u16(),
                        });
                    }
                    last_error = format!("status {}", status.as_u16());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                let backoff = backoff_delay(attempt);
                warn!(
                    url = media_url,
                    attempt = attempt + 1,
                    error = %last_error,
                    backoff_ms = backoff.as_millis() as u64,
                    "Media resolution failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
        }

        Err(ResolveError::Exhausted {
            attempts: MAX_ATTEMPTS,
            last_error,
        })
    }
}

impl Default for MediaResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE * 2u32.pow(attempt);
    let capped = exp.min(BACKOFF_CAP);
    let jitter = Duration::from_millis(rand::rng().random_range(0..100));
    capped + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Bare-bones HTTP server answering the nth request with the nth status
    /// from `statuses` (last status repeats). Returns base URL + hit counter.
    async fn serve_statuses(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = *statuses.get(n).or(statuses.last()).unwrap();
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    503 => "Service Unavailable",
                    _ => "Unknown",
                };
                let body = "cdn-bytes";
                let resp = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let mut buf = [0u8; 2048];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });

        (format!("http://{addr}"), hits)
    }

    #[tokio::test]
    async fn follows_redirects_to_the_terminal_url() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 2048];
                let n = sock.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);

                let resp = if request.starts_with("GET /cdn/final") {
                    "HTTP/1.1 200 OK\r\ncontent-length: 9\r\nconnection: close\r\n\r\ncdn-bytes"
                        .to_string()
                } else {
                    "HTTP/1.1 302 Found\r\nlocation: /cdn/final\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                        .to_string()
                };
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });

        let url = format!("http://{addr}/p/abc/media");
        let resolved = MediaResolver::new().resolve(&url).await.unwrap();

        assert_eq!(resolved, format!("http://{addr}/cdn/final"));
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let (base, hits) = serve_statuses(vec![503, 503, 200]).await;
        let url = format!("{base}/p/abc/media");

        let resolved = MediaResolver::new().resolve(&url).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(resolved, url);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let (base, hits) = serve_statuses(vec![404]).await;
        let url = format!("{base}/p/gone/media");

        let err = MediaResolver::new().resolve(&url).await.unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ResolveError::Permanent { status: 404 }));
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let (base, hits) = serve_statuses(vec![503]).await;
        let url = format!("{base}/p/flaky/media");

        let err = MediaResolver::new().resolve(&url).await.unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(matches!(err, ResolveError::Exhausted { attempts: 3, .. }));
    }
}
