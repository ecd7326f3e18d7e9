//! Health check endpoint
//!
//! Liveness only: returns 200 whenever the process is serving HTTP. The
//! body reports chain connection state and ingress queue headroom so
//! operators can tell a disconnected or saturated dispatcher apart.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub node_id: String,
    pub timestamp: String,
    pub chain: ChainHealth,
    pub queue: QueueHealth,
}

#[derive(Serialize)]
pub struct ChainHealth {
    pub enabled: bool,
    pub connected: bool,
}

#[derive(Serialize)]
pub struct QueueHealth {
    pub capacity: usize,
    pub available: usize,
    pub accepting: bool,
}

pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        node_id: state.args.node_id.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        chain: ChainHealth {
            enabled: state.chain.is_some(),
            connected: state.chain.as_ref().map(|c| c.is_connected()).unwrap_or(false),
        },
        queue: QueueHealth {
            capacity: state.events.capacity(),
            available: state.events.available(),
            accepting: !state.events.is_closed(),
        },
    };

    json_response(StatusCode::OK, &response)
}
