//! HTTP routes for Herald

pub mod devices;
pub mod health;
pub mod inbox;
pub mod webhooks;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::HeraldError;

pub use devices::{handle_register_device, handle_unregister_device};
pub use health::health_check;
pub use inbox::handle_notifications_request;
pub use webhooks::{handle_broadcast_notification, handle_comment_notification, handle_reward_notification};

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Error response with `{"error": ...}` body
pub fn error_response(err: HeraldError) -> Response<Full<Bytes>> {
    let (status, body) = err.into_status_code_and_body();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Not found response
pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": "Not Found", "path": path }),
    )
}
