//! Requester lookup through the identity endpoint
//!
//! The caller's `Cookie` header is forwarded unchanged to `UserUrl`, which
//! answers 2xx with `{"Id": "...", "Email": "..."}` for a valid session.

use std::time::Duration;

use reqwest::header::COOKIE;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Record;

/// The user who triggered a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject id used for the confirmation record
    #[serde(rename = "Id")]
    pub id: String,
    /// Where the confirmation message goes
    #[serde(rename = "Email")]
    pub email: String,
}

impl Identity {
    /// Confirmation record addressed to this user
    pub fn confirmation_record(&self) -> Record {
        Record::new(self.id.clone(), self.email.clone())
    }
}

/// HTTP client for the identity endpoint
#[derive(Clone, Debug)]
pub struct IdentityClient {
    client: reqwest::Client,
    url: String,
}

impl IdentityClient {
    /// Create a client for `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Resolve the requester behind `cookie_header`
    ///
    /// A non-2xx answer or an identity without id or email is `Unauthorized`.
    pub async fn resolve(&self, cookie_header: &str) -> Result<Identity> {
        let response = self
            .client
            .get(&self.url)
            .header(COOKIE, cookie_header)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = %status, "Identity endpoint rejected session");
            return Err(Error::Unauthorized(format!(
                "identity endpoint answered HTTP {}",
                status
            )));
        }

        let identity: Identity = response
            .json()
            .await
            .map_err(|e| Error::Unauthorized(format!("invalid identity response: {}", e)))?;

        if identity.id.trim().is_empty() || identity.email.trim().is_empty() {
            return Err(Error::Unauthorized(
                "identity response is missing Id or Email".to_string(),
            ));
        }

        Ok(identity)
    }
}
