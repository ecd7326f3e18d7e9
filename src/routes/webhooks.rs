//! Webhook ingress
//!
//! Each accepted body becomes exactly one semantic event on the same queue
//! the chain classifier feeds, answered with 202 before any planning runs.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::{error_response, json_response};
use crate::events::{
    BroadcastKind, BroadcastRequest, EventEnvelope, ReplyPosted, RewardRequest, RewardUnlocked, SemanticEvent,
};
use crate::server::AppState;
use crate::types::{HeraldError, Result};

fn decode<T: DeserializeOwned>(route: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(route, error = %e, "Rejecting malformed webhook body");
        HeraldError::from(e)
    })
}

async fn accept(state: &AppState, event: SemanticEvent) -> Response<Full<Bytes>> {
    let envelope = EventEnvelope::from_webhook(event);
    let event_id = envelope.id.clone();
    let kind = envelope.event.name();

    match state.events.enqueue(envelope).await {
        Ok(()) => {
            info!(event_id = %event_id, kind, "Webhook event accepted");
            json_response(
                StatusCode::ACCEPTED,
                &serde_json::json!({ "status": "accepted", "event_id": event_id }),
            )
        }
        Err(e) => {
            warn!(event_id = %event_id, kind, error = %e, "Webhook event refused");
            error_response(e)
        }
    }
}

/// POST /sendCommentNotification
pub async fn handle_comment_notification(state: &AppState, body: Bytes) -> Response<Full<Bytes>> {
    let reply: ReplyPosted = match decode("comment", &body) {
        Ok(reply) => reply,
        Err(e) => return error_response(e),
    };
    if reply.creator.trim().is_empty() {
        return error_response(HeraldError::BadRequest("creator is required".to_string()));
    }
    accept(state, SemanticEvent::ReplyPosted(reply)).await
}

/// POST /sendRewardNotification
pub async fn handle_reward_notification(state: &AppState, body: Bytes) -> Response<Full<Bytes>> {
    let request: RewardRequest = match decode("reward", &body) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };
    match RewardUnlocked::try_from(request) {
        Ok(reward) => accept(state, SemanticEvent::RewardUnlocked(reward)).await,
        Err(e) => {
            warn!(error = %e, "Rejecting reward notification");
            error_response(e)
        }
    }
}

/// POST /sendBroadcastNotification
pub async fn handle_broadcast_notification(state: &AppState, body: Bytes) -> Response<Full<Bytes>> {
    let request: BroadcastRequest = match decode("broadcast", &body) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };
    match BroadcastKind::try_from(request) {
        Ok(kind) => accept(state, SemanticEvent::BroadcastRequested(kind)).await,
        Err(e) => {
            warn!(error = %e, "Rejecting broadcast notification");
            error_response(e)
        }
    }
}
