//! Alertmanager v2 HTTP client.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Result, SilencerError};
use crate::store::SilenceStore;
use crate::types::{ExistingSilence, Silence};

const SILENCES_PATH: &str = "api/v2/silences";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostSilenceResponse {
    #[serde(rename = "silenceID")]
    silence_id: String,
}

/// A [`SilenceStore`] backed by Alertmanager's `/api/v2/silences` endpoint.
#[derive(Debug, Clone)]
pub struct AlertmanagerClient {
    client: reqwest::Client,
    base_url: Url,
}

impl AlertmanagerClient {
    /// Creates a client for the Alertmanager at `url` (e.g. `http://localhost:9093`).
    ///
    /// A path on the URL is kept as a prefix, so Alertmanager served under a
    /// sub-path works too.
    ///
    /// # Errors
    ///
    /// Returns `SilencerError::InvalidConfig` if the URL does not parse or has
    /// no http(s) scheme and host.
    pub fn new(url: &str) -> Result<Self> {
        Self::build(url, reqwest::Client::builder())
    }

    /// Creates a client whose requests are cut off after `timeout`.
    ///
    /// # Errors
    ///
    /// See [`AlertmanagerClient::new`].
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        Self::build(url, reqwest::Client::builder().timeout(timeout))
    }

    fn build(url: &str, builder: reqwest::ClientBuilder) -> Result<Self> {
        let base_url = parse_base_url(url)?;
        debug!(scheme = %base_url.scheme(), host = ?base_url.host_str(), "alertmanager endpoint");

        let client = builder.build().map_err(|e| SilencerError::InvalidConfig {
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self { client, base_url })
    }

    /// Returns the Alertmanager base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn silences_url(&self) -> String {
        format!(
            "{}/{SILENCES_PATH}",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

pub(crate) fn parse_base_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| SilencerError::InvalidConfig {
        reason: format!("invalid alertmanager URL {url:?}: {e}"),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SilencerError::InvalidConfig {
            reason: format!("alertmanager URL {url:?} must use http or https"),
        });
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(SilencerError::InvalidConfig {
            reason: format!("alertmanager URL {url:?} has no host"),
        });
    }

    Ok(parsed)
}

async fn error_body(status: StatusCode, response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    format!("alertmanager returned {status}: {}", body.trim())
}

impl SilenceStore for AlertmanagerClient {
    async fn list_silences(&self, filter: &str) -> Result<Vec<ExistingSilence>> {
        let query_error = |reason: String| SilencerError::StoreQuery {
            filter: filter.to_string(),
            reason,
        };

        let response = self
            .client
            .get(self.silences_url())
            .query(&[("filter", filter)])
            .send()
            .await
            .map_err(|e| query_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(query_error(error_body(status, response).await));
        }

        let silences: Vec<ExistingSilence> = response
            .json()
            .await
            .map_err(|e| query_error(format!("invalid silence list: {e}")))?;
        trace!(filter = %filter, count = silences.len(), "listed silences");
        Ok(silences)
    }

    async fn create_silence(&self, silence: &Silence) -> Result<String> {
        let matcher = silence
            .matchers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let create_error = |reason: String| SilencerError::StoreCreate {
            matcher: matcher.clone(),
            reason,
        };

        let response = self
            .client
            .post(self.silences_url())
            .json(silence)
            .send()
            .await
            .map_err(|e| create_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(create_error(error_body(status, response).await));
        }

        let created: PostSilenceResponse = response
            .json()
            .await
            .map_err(|e| create_error(format!("invalid create response: {e}")))?;
        Ok(created.silence_id)
    }
}
