//! Route handlers for the trigger API

use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::api::auth::cookie_header;
use crate::error::{Error, Result};
use crate::pipeline::CsvRecordSource;
use crate::types::RunSummary;

/// Response body of `POST /send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SendResponse {
    /// Records processed, including the requester's confirmation
    #[serde(rename = "NumSent")]
    pub num_sent: usize,
    /// Wall-clock duration of the run in whole seconds
    #[serde(rename = "Seconds")]
    pub seconds: i64,
}

impl From<&RunSummary> for SendResponse {
    fn from(summary: &RunSummary) -> Self {
        Self {
            num_sent: summary.total_processed,
            seconds: summary.elapsed_seconds,
        }
    }
}

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// POST /send - Run the configured batch, with the requester as confirmation
///
/// The run continues to completion even if the client goes away first.
#[utoipa::path(
    post,
    path = "/send",
    tag = "batch",
    responses(
        (status = 200, description = "Batch run finished", body = SendResponse),
        (status = 401, description = "Missing session cookie or unknown requester", body = crate::error::ApiError),
        (status = 409, description = "A batch run is already in progress", body = crate::error::ApiError),
        (status = 500, description = "Batch run failed", body = crate::error::ApiError),
        (status = 502, description = "Upstream service unavailable", body = crate::error::ApiError)
    )
)]
pub async fn send_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SendResponse>> {
    let identity_client = state
        .identity
        .as_ref()
        .ok_or_else(|| Error::config("UserUrl", "identity endpoint is not configured"))?;
    let identity = identity_client.resolve(&cookie_header(&headers)).await?;

    let data_file = state
        .data_file
        .clone()
        .ok_or_else(|| Error::config("Api.DataFile", "no batch input configured"))?;

    let run_slot = state.try_begin_run()?;

    tracing::info!(
        requester = %identity.email,
        data_file = %data_file.display(),
        "Batch run triggered"
    );

    // The run owns its slot and outlives this request: a client that
    // disconnects drops only the JoinHandle, not the batch
    let pipeline = state.pipeline.clone();
    let shutdown = state.shutdown.clone();
    let confirmation = identity.confirmation_record();
    let run = tokio::spawn(async move {
        let _run_slot = run_slot;
        pipeline
            .run(
                CsvRecordSource::new(data_file),
                Some(confirmation),
                &shutdown,
            )
            .await
    });

    let summary = run
        .await
        .map_err(|e| Error::Other(format!("batch run task failed: {}", e)))??;

    Ok(Json(SendResponse::from(&summary)))
}
