//! Session cookie middleware for the trigger API
//!
//! Routes behind [`require_session`] only run when the request carries a
//! non-empty cookie with the configured session name. The cookie value is not
//! checked here; the identity endpoint decides whether it is valid.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::Error;

/// Reject requests without the session cookie
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware, routing::post};
/// use recmailer::api::auth::require_session;
///
/// let router: Router = Router::new()
///     .route("/send", post(|| async { "sent" }))
///     .route_layer(middleware::from_fn_with_state(
///         "session".to_string(),
///         require_session,
///     ));
/// ```
pub async fn require_session(
    State(cookie_name): State<String>,
    request: Request,
    next: Next,
) -> Response {
    if session_cookie(request.headers(), &cookie_name).is_some() {
        next.run(request).await
    } else {
        Error::Unauthorized(format!("missing {} cookie", cookie_name)).into_response()
    }
}

/// Value of the named cookie, if present and non-empty
pub fn session_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

/// All `Cookie` headers joined into one header value
pub fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ")
}
