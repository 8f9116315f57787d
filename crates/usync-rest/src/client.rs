//! HTTP client for the profile snapshot endpoint.

use crate::error::{RestError, RestResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use usync_core::{Credentials, FetchError, SnapshotSource, UserSnapshot};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the profile snapshot endpoint.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    /// HTTP client.
    client: Client,
    /// Snapshot endpoint URL.
    profile_url: String,
    /// Member of the response body carrying the identity key.
    identity_field: String,
}

impl ProfileClient {
    /// Create a new profile client.
    ///
    /// # Arguments
    /// * `profile_url` - URL of the snapshot endpoint (e.g., "https://api.example.com/profile")
    /// * `identity_field` - response member holding the identity key (e.g., "id")
    pub fn new(
        profile_url: impl Into<String>,
        identity_field: impl Into<String>,
    ) -> RestResult<Self> {
        Self::with_timeout(profile_url, identity_field, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        profile_url: impl Into<String>,
        identity_field: impl Into<String>,
        timeout: Duration,
    ) -> RestResult<Self> {
        let profile_url = profile_url.into();
        reqwest::Url::parse(&profile_url)
            .map_err(|e| RestError::InvalidUrl(format!("{profile_url}: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            profile_url,
            identity_field: identity_field.into(),
        })
    }

    /// Fetch the current snapshot with a bearer token.
    ///
    /// # Errors
    /// - `FetchError::Http`: request could not be sent or the body not read
    /// - `FetchError::Status`: non-2xx response
    /// - `FetchError::Malformed`: body is not a JSON object with an identity
    pub async fn fetch_profile(&self, token: &str) -> Result<UserSnapshot, FetchError> {
        debug!(url = %self.profile_url, "Fetching profile snapshot");

        let response = self
            .client
            .get(&self.profile_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Http(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(format!("Failed to read response: {e}")))?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(format!("Failed to parse response: {e}")))?;

        Ok(UserSnapshot::from_profile(value, &self.identity_field)?)
    }
}

#[async_trait]
impl SnapshotSource for ProfileClient {
    async fn fetch(&self, credentials: &Credentials) -> Result<UserSnapshot, FetchError> {
        self.fetch_profile(&credentials.token).await
    }
}
