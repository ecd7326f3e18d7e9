//! Inbox and read-state routes
//!
//! - `GET  /notifications/{account_id}?limit=&offset=`
//! - `GET  /notifications/{account_id}/counts`
//! - `POST /notifications/{account_id}/read`
//! - `POST /notifications/{account_id}/seen`
//! - `POST /notifications/{account_id}/threads/{claim_id}/read`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};

use super::{error_response, json_response, not_found_response};
use crate::server::AppState;
use crate::types::{HeraldError, Result};

fn parse_id(what: &str, raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| HeraldError::BadRequest(format!("invalid {}: {}", what, raw)))
}

fn query_param(query: Option<&str>, name: &str) -> Result<Option<i64>> {
    let Some(query) = query else {
        return Ok(None);
    };
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some(name) {
            let value = parts.next().unwrap_or_default();
            return parse_id(name, value).map(Some);
        }
    }
    Ok(None)
}

fn method_not_allowed(method: &Method, path: &str) -> Response<Full<Bytes>> {
    error_response(HeraldError::MethodNotAllowed(format!("{} {}", method, path)))
}

/// Route a request under `/notifications/`
pub async fn handle_notifications_request(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let rest = path.strip_prefix("/notifications/").unwrap_or_default();
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    let Some(raw_id) = segments.first() else {
        return not_found_response(path);
    };
    let account_id = match parse_id("account id", raw_id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    let inbox = &state.inbox;
    let result = match (&segments[1..], method) {
        ([], &Method::GET) => {
            let page = query_param(query, "limit").and_then(|limit| {
                let offset = query_param(query, "offset")?;
                inbox.list(account_id, limit, offset)
            });
            page.map(|list| json_response(StatusCode::OK, &list))
        }
        (["counts"], &Method::GET) => inbox
            .counts(account_id)
            .map(|counts| json_response(StatusCode::OK, &counts)),
        (["read"], &Method::POST) => inbox
            .mark_all_read(account_id)
            .map(|updated| json_response(StatusCode::OK, &serde_json::json!({ "updated": updated }))),
        (["seen"], &Method::POST) => inbox
            .mark_all_seen(account_id)
            .map(|updated| json_response(StatusCode::OK, &serde_json::json!({ "updated": updated }))),
        (["threads", claim, "read"], &Method::POST) => parse_id("claim id", claim).and_then(|claim_id| {
            inbox
                .mark_thread_read(account_id, claim_id)
                .map(|updated| json_response(StatusCode::OK, &serde_json::json!({ "updated": updated })))
        }),
        ([] | ["counts"] | ["read"] | ["seen"] | ["threads", _, "read"], _) => {
            return method_not_allowed(method, path);
        }
        _ => return not_found_response(path),
    };

    result.unwrap_or_else(error_response)
}
