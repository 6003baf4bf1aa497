use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::api::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest inbound request id that is echoed back instead of replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn resolve_request_id(header: Option<&HeaderValue>) -> String {
    header
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::new_v4().to_string(), String::from)
}

/// Tags every request with an id, exposed to handlers as [`RequestId`] and
/// echoed in the `x-request-id` response header.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = resolve_request_id(req.headers().get(REQUEST_ID_HEADER));

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, val);
    }

    res
}

/// Fallback for unknown routes, wrapped in the standard error envelope.
pub async fn not_found(req: Request) -> Response {
    let id = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(|| Uuid::new_v4().to_string(), |r| r.0.clone());
    let body = ApiError::new(id, "not_found", format!("no route for {}", req.uri().path()));
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
