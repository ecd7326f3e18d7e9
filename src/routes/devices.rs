//! Device registration routes (`POST /devices`, `DELETE /devices`)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use tracing::info;

use super::{error_response, json_response};
use crate::db::{Device, Platform};
use crate::server::AppState;
use crate::types::{HeraldError, Result};

#[derive(Debug, Deserialize)]
struct DeviceRequest {
    address: String,
    token: String,
    platform: String,
}

fn parse_device(body: &[u8]) -> Result<Device> {
    let request: DeviceRequest = serde_json::from_slice(body)?;
    if request.address.trim().is_empty() || request.token.trim().is_empty() {
        return Err(HeraldError::BadRequest("address and token are required".to_string()));
    }
    let platform: Platform = request.platform.parse()?;

    Ok(Device {
        address: request.address,
        token: request.token,
        platform,
    })
}

pub async fn handle_register_device(state: &AppState, body: Bytes) -> Response<Full<Bytes>> {
    let result = parse_device(&body).and_then(|device| {
        let registered = state.inbox.register_device(&device)?;
        info!(address = %device.address, platform = %device.platform, registered, "Device registration");
        Ok(registered)
    });

    match result {
        Ok(registered) => json_response(StatusCode::CREATED, &serde_json::json!({ "registered": registered })),
        Err(e) => error_response(e),
    }
}

pub async fn handle_unregister_device(state: &AppState, body: Bytes) -> Response<Full<Bytes>> {
    let result = parse_device(&body).and_then(|device| {
        let removed = state.inbox.unregister_device(&device)?;
        info!(address = %device.address, platform = %device.platform, removed, "Device removal");
        Ok(removed)
    });

    match result {
        Ok(removed) => json_response(StatusCode::OK, &serde_json::json!({ "removed": removed })),
        Err(e) => error_response(e),
    }
}
