//! Push dispatch
//!
//! Best-effort: a failed or timed-out send is logged and dropped. The inbox
//! row written before dispatch is the durable record.

pub mod gateway;
pub mod payload;

use std::sync::Arc;

use tracing::{debug, error, warn};

pub use gateway::{HttpPushGateway, PushTransport};
pub use payload::{PushPayload, TrustoryPayload};

use crate::inbox::InboxService;
use crate::notification::NotificationRecord;
use crate::types::HeraldError;

/// Sends pushes for persisted notifications
pub struct PushDispatcher {
    inbox: Arc<InboxService>,
    transport: Arc<dyn PushTransport>,
    asset_url: String,
}

impl PushDispatcher {
    pub fn new(inbox: Arc<InboxService>, transport: Arc<dyn PushTransport>, asset_url: impl Into<String>) -> Self {
        Self {
            inbox,
            transport,
            asset_url: asset_url.into(),
        }
    }

    /// Push one record to every device of its recipient
    ///
    /// Returns how many devices the gateway accepted.
    pub async fn dispatch(&self, record: &NotificationRecord) -> usize {
        let devices = match self.inbox.devices_for(&record.address) {
            Ok(devices) => devices,
            Err(e) => {
                error!(notification_id = record.id, error = %e, "Device lookup failed");
                return 0;
            }
        };

        if devices.is_empty() {
            debug!(notification_id = record.id, recipient = record.recipient_id, "No devices registered");
            return 0;
        }

        let mut delivered = 0;
        for device in &devices {
            let payload = PushPayload::for_device(record, device, &self.asset_url);
            match self.transport.send(&payload).await {
                Ok(()) => delivered += 1,
                Err(HeraldError::Upstream(e)) => {
                    warn!(notification_id = record.id, platform = %device.platform, error = %e, "Push rejected");
                }
                Err(e) => {
                    error!(notification_id = record.id, platform = %device.platform, error = %e, "Push failed");
                }
            }
        }

        debug!(
            notification_id = record.id,
            devices = devices.len(),
            delivered,
            "Push dispatched"
        );
        delivered
    }
}
