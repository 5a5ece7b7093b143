//! OpenAPI documentation for the trigger API

use utoipa::OpenApi;

/// OpenAPI documentation for the recmailer trigger API
///
/// Served at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "recmailer trigger API",
        version = "0.1.0",
        description = "Triggers batch recommendation mail runs"
    ),
    paths(
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::send_batch,
    ),
    components(
        schemas(
            crate::api::routes::SendResponse,
            crate::types::RunSummary,
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "batch", description = "Batch runs"),
        (name = "system", description = "Health and API documentation")
    )
)]
pub struct ApiDoc;
