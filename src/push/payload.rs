//! Push gateway request body

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::db::{Device, Platform};
use crate::mention::plain_text;
use crate::notification::NotificationRecord;

/// App-specific block the mobile client uses to deep-link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustoryPayload {
    /// Inbox row id
    pub id: i64,
    /// Anchor id
    pub type_id: i64,
    /// RFC3339
    pub timestamp: String,
    pub read: bool,
    /// Notification kind code
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// One POST to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub tokens: Vec<String>,
    pub platform: Platform,
    pub title: String,
    pub body: String,
    pub trustory: TrustoryPayload,
}

impl PushPayload {
    /// Payload for one device; `asset_url` is the icon base URL
    pub fn for_device(record: &NotificationRecord, device: &Device, asset_url: &str) -> Self {
        let image = (!asset_url.is_empty())
            .then(|| format!("{}/{}", asset_url.trim_end_matches('/'), record.kind.icon()));

        Self {
            tokens: vec![device.token.clone()],
            platform: device.platform,
            title: record.kind.title().to_string(),
            body: plain_text(&record.body),
            trustory: TrustoryPayload {
                id: record.id,
                type_id: record.anchor,
                timestamp: record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                read: record.read,
                kind: record.kind.code(),
                user_id: record.sender_id,
                image,
            },
        }
    }
}
