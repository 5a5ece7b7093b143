//! Payload fetching from the recommendation endpoint.

use crate::config::{Config, expand_url_template};
use crate::error::{Error, ProcessError};
use crate::types::RecResponse;

/// Fetches suggestions for one subject over a reusable HTTP client.
pub struct PayloadClient {
    client: reqwest::Client,
    url_template: String,
    default_thumbnail_url: String,
}

impl PayloadClient {
    /// Create a client from its parts
    pub fn new(
        client: reqwest::Client,
        url_template: impl Into<String>,
        default_thumbnail_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            default_thumbnail_url: default_thumbnail_url.into(),
        }
    }

    /// Build a client with its own connection pool from the config
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .user_agent(concat!("recmailer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;
        Ok(Self::new(
            client,
            config.rec_url.clone(),
            config.default_thumbnail_url.clone(),
        ))
    }

    /// Request URL for a subject
    pub fn url_for(&self, subject_id: &str) -> String {
        expand_url_template(&self.url_template, subject_id)
    }

    /// Fetch and validate the payload for `subject_id`.
    ///
    /// Fails on network errors, timeouts, non-2xx statuses, bodies that are not
    /// the expected JSON, and payloads without suggestions. Suggestions without
    /// a thumbnail get the configured default.
    pub async fn fetch(&self, subject_id: &str) -> Result<RecResponse, ProcessError> {
        let url = self.url_for(subject_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProcessError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessError::Fetch {
                url,
                reason: format!("HTTP {}", status),
            });
        }

        let body = response.bytes().await.map_err(|e| ProcessError::Fetch {
            url: url.clone(),
            reason: format!("failed to read body: {}", e),
        })?;

        let mut payload: RecResponse =
            serde_json::from_slice(&body).map_err(|e| ProcessError::Parse(e.to_string()))?;

        if payload.suggestions.is_empty() {
            return Err(ProcessError::EmptyResult);
        }

        fill_missing_thumbnails(&mut payload, &self.default_thumbnail_url);
        Ok(payload)
    }
}

/// Give every suggestion without a thumbnail URL the default one
pub fn fill_missing_thumbnails(payload: &mut RecResponse, default_url: &str) {
    for suggestion in &mut payload.suggestions {
        if suggestion.thumbnail.url.is_empty() {
            suggestion.thumbnail.url = default_url.to_string();
        }
    }
}
