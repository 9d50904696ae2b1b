pub mod error;
pub mod resolve;
pub mod types;

pub use error::{InstagramError, Result};
pub use resolve::{MediaResolver, ResolveError};
pub use types::{LongLivedToken, MediaDetail, ShortLivedToken};

use types::{MediaListResponse, ProfileResponse};

const API_BASE_URL: &str = "https://api.instagram.com";
const GRAPH_BASE_URL: &str = "https://graph.instagram.com";

/// Graph API version used for media endpoints.
const GRAPH_VERSION: &str = "v22.0";

/// Client for the Instagram Graph API: OAuth code exchange, long-lived token
/// management, and media listing/detail for one authorized account.
pub struct InstagramClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    api_base: String,
    graph_base: String,
}

impl InstagramClient {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            redirect_uri,
            api_base: API_BASE_URL.to_string(),
            graph_base: GRAPH_BASE_URL.to_string(),
        }
    }

    /// Point both API hosts somewhere else. Test hook.
    pub fn with_base_urls(mut self, api_base: &str, graph_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.graph_base = graph_base.trim_end_matches('/').to_string();
        self
    }

    /// Exchange an authorization code for a short-lived access token.
    /// A 400 from this endpoint means the code itself was bad or expired.
    pub async fn exchange_code(&self, code: &str) -> Result<ShortLivedToken> {
        let url = format!("{}/oauth/access_token", self.api_base);
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
        ];

        let resp = self.client.post(&url).form(&form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST {
                return Err(InstagramError::InvalidCode(body));
            }
            return Err(InstagramError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }

    /// Fetch the account handle for a token.
    pub async fn fetch_handle(&self, access_token: &str) -> Result<String> {
        let url = format!("{}/me", self.graph_base);
        let resp = self
            .client
            .get(&url)
            .query(&[("fields", "username"), ("access_token", access_token)])
            .send()
            .await?;

        let profile: ProfileResponse = check(resp).await?.json().await?;
        Ok(profile.username)
    }

    /// Exchange a short-lived token for a long-lived one (~60 days).
    pub async fn exchange_long_lived(&self, short_token: &str) -> Result<LongLivedToken> {
        let url = format!("{}/access_token", self.graph_base);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "ig_exchange_token"),
                ("client_secret", self.client_secret.as_str()),
                ("access_token", short_token),
            ])
            .send()
            .await?;

        Ok(check(resp).await?.json().await?)
    }

    /// Refresh an unexpired long-lived token. Upstream only allows this once
    /// the token is at least 24 hours old; a rejection surfaces as an `Api`
    /// error for the caller to log and skip.
    pub async fn refresh_long_lived(&self, access_token: &str) -> Result<LongLivedToken> {
        let url = format!("{}/refresh_access_token", self.graph_base);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "ig_refresh_token"),
                ("access_token", access_token),
            ])
            .send()
            .await?;

        Ok(check(resp).await?.json().await?)
    }

    /// List ids of media items created at or after `since` (unix seconds).
    /// The timestamp filter is applied source-side.
    pub async fn list_media_ids(&self, access_token: &str, since: i64) -> Result<Vec<String>> {
        let url = format!("{}/{}/me/media", self.graph_base, GRAPH_VERSION);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("access_token", access_token),
                ("since", &since.to_string()),
            ])
            .send()
            .await?;

        let list: MediaListResponse = check(resp).await?.json().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    /// Fetch caption, media type, permalink, and timestamp for one media id.
    pub async fn media_detail(&self, access_token: &str, media_id: &str) -> Result<MediaDetail> {
        let url = format!("{}/{}/{}", self.graph_base, GRAPH_VERSION, media_id);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("fields", "caption,media_type,permalink,timestamp"),
                ("access_token", access_token),
            ])
            .send()
            .await?;

        Ok(check(resp).await?.json().await?)
    }
}

/// Derive the redirect-style media URL from a permalink.
/// `https://www.instagram.com/p/XYZ/` → `https://www.instagram.com/p/XYZ/media`
pub fn media_url_from_permalink(permalink: &str) -> String {
    format!("{}/media", permalink.trim_end_matches('/'))
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(InstagramError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_url_appends_media_segment() {
        assert_eq!(
            media_url_from_permalink("https://www.instagram.com/p/DKpmYdVJV_T/"),
            "https://www.instagram.com/p/DKpmYdVJV_T/media"
        );
        assert_eq!(
            media_url_from_permalink("https://www.instagram.com/p/DKpmYdVJV_T"),
            "https://www.instagram.com/p/DKpmYdVJV_T/media"
        );
    }
}
