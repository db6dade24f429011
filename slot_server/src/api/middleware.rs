//! Caller identity middleware for protected endpoints.
//!
//! Credentials are verified upstream; by the time a request reaches this
//! server the gateway has stamped the caller's id into the `X-User-Id`
//! header. The middleware parses it and injects the user id into request
//! extensions for downstream handlers.
//!
//! # Extracting User ID
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//!
//! async fn protected_handler(Extension(user_id): Extension<i64>) -> String {
//!     format!("Playing as user {}", user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::logging::log_security_event;

/// Header carrying the authenticated caller
pub const USER_ID_HEADER: &str = "x-user-id";

/// Parse a positive user id from the identity header
pub fn user_id_from_headers(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
}

/// Identity middleware that injects the caller's user id.
///
/// # Behavior
///
/// - **Valid header**: Injects `user_id: i64` into request extensions → Calls next handler
/// - **Missing or malformed header**: Returns `401 Unauthorized`
pub async fn identity_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    match user_id_from_headers(request.headers()) {
        Some(user_id) => {
            request.extensions_mut().insert(user_id);
            Ok(next.run(request).await)
        }
        None => {
            let path = request.uri().path().to_string();
            log_security_event(
                "missing_identity",
                None,
                None,
                &format!("Rejected request to {path} without a valid {USER_ID_HEADER}"),
            );
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
