//! Token lifecycle: authorization-code exchange and scheduled refresh of
//! long-lived credentials nearing expiry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use campusbeat_common::NewCredential;
use instagram_client::InstagramError;

use crate::traits::{CredentialStore, OrganizationDirectory, SourcePlatform};

/// How an authorization-code exchange resolved.
///
/// `NotRegistered` is a modeled business outcome, not an error: the account
/// authorized us, but nobody registered an organization under that handle.
/// Callers present a friendly "register first" message for it.
#[derive(Debug)]
pub enum ExchangeOutcome {
    Registered {
        organization_id: Uuid,
        handle: String,
    },
    NotRegistered {
        handle: String,
    },
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Authorization code rejected: {0}")]
    InvalidCode(String),

    #[error("Upstream error during exchange: {0}")]
    Upstream(InstagramError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct TokenLifecycle {
    source: Arc<dyn SourcePlatform>,
    organizations: Arc<dyn OrganizationDirectory>,
    credentials: Arc<dyn CredentialStore>,
}

impl TokenLifecycle {
    pub fn new(
        source: Arc<dyn SourcePlatform>,
        organizations: Arc<dyn OrganizationDirectory>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            source,
            organizations,
            credentials,
        }
    }

    /// Trade an authorization code for a long-lived credential.
    ///
    /// Short-lived exchange → handle lookup → organization match →
    /// long-lived exchange → credential upsert. An unknown handle short-
    /// circuits to `NotRegistered` before any long-lived token is minted.
    pub async fn exchange(&self, code: &str) -> Result<ExchangeOutcome, ExchangeError> {
        let short = self
            .source
            .exchange_code(code)
            .await
            .map_err(classify_exchange_error)?;

        let handle = self
            .source
            .fetch_handle(&short.access_token)
            .await
            .map_err(ExchangeError::Upstream)?;

        let Some(organization) = self.organizations.find_by_handle(&handle).await? else {
            info!(handle = %handle, "Authorized account has no registered organization");
            return Ok(ExchangeOutcome::NotRegistered { handle });
        };

        let long = self
            .source
            .exchange_long_lived(&short.access_token)
            .await
            .map_err(ExchangeError::Upstream)?;

        let expires_at = Utc::now() + Duration::seconds(long.expires_in);
        self.credentials
            .upsert(NewCredential {
                organization_id: organization.id,
                instagram_handle: handle.clone(),
                access_token: long.access_token,
                expires_at,
            })
            .await?;

        info!(
            organization_id = %organization.id,
            handle = %handle,
            expires_at = %expires_at,
            "Credential stored"
        );

        Ok(ExchangeOutcome::Registered {
            organization_id: organization.id,
            handle,
        })
    }

    /// Refresh every credential expiring within `horizon_days` of `now`.
    ///
    /// Upstream only refreshes tokens that are at least 24 hours old and
    /// still unexpired; we don't re-check that here — its rejections are
    /// per-item failures, logged and skipped so one organization's bad token
    /// never blocks the rest. Returns the count successfully refreshed.
    pub async fn refresh_expiring(
        &self,
        now: DateTime<Utc>,
        horizon_days: u32,
    ) -> anyhow::Result<usize> {
        let cutoff = now + Duration::days(horizon_days as i64);
        let expiring = self.credentials.expiring_within(cutoff).await?;

        if expiring.is_empty() {
            info!(horizon_days, "No credentials near expiry");
            return Ok(0);
        }

        info!(count = expiring.len(), horizon_days, "Refreshing expiring credentials");

        let mut refreshed = 0;
        for credential in expiring {
            let long = match self.source.refresh_long_lived(&credential.access_token).await {
                Ok(long) => long,
                Err(e) => {
                    warn!(
                        organization_id = %credential.organization_id,
                        handle = %credential.instagram_handle,
                        error = %e,
                        "Token refresh failed, skipping"
                    );
                    continue;
                }
            };

            let expires_at = now + Duration::seconds(long.expires_in);
            match self
                .credentials
                .update_token(credential.organization_id, &long.access_token, expires_at)
                .await
            {
                Ok(()) => {
                    info!(
                        organization_id = %credential.organization_id,
                        expires_at = %expires_at,
                        "Credential refreshed"
                    );
                    refreshed += 1;
                }
                Err(e) => {
                    warn!(
                        organization_id = %credential.organization_id,
                        error = %e,
                        "Failed to store refreshed token, prior token stays in force"
                    );
                }
            }
        }

        Ok(refreshed)
    }
}

fn classify_exchange_error(err: InstagramError) -> ExchangeError {
    match err {
        InstagramError::InvalidCode(msg) => ExchangeError::InvalidCode(msg),
        other => ExchangeError::Upstream(other),
    }
}
