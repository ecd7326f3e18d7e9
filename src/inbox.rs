//! Inbox service - persistence and read-state operations
//!
//! Wraps the notification and device repositories. The pipeline's inbox
//! workers call [`InboxService::persist`]; the HTTP read-state routes call
//! the counter and mark operations.

use std::sync::Arc;

use serde::Serialize;

use crate::db::{devices, notifications, Database, Device};
use crate::notification::{NotificationRecord, PlannedNotification};
use crate::types::Result;

/// Default and maximum inbox page size
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Unread and unseen counters for one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub unread: i64,
    pub unseen: i64,
}

/// Inbox service shared by the pipeline and the HTTP API
pub struct InboxService {
    db: Arc<Database>,
}

impl InboxService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Append one planned notification as a fresh inbox row
    pub fn persist(&self, planned: &PlannedNotification) -> Result<NotificationRecord> {
        self.db.with_conn(|conn| notifications::insert_notification(conn, planned))
    }

    /// Live device lookup; never cached
    pub fn devices_for(&self, address: &str) -> Result<Vec<Device>> {
        self.db.with_conn(|conn| devices::devices_for(conn, address))
    }

    // =========================================================================
    // Read state
    // =========================================================================

    pub fn list(&self, recipient_id: i64, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<NotificationRecord>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);
        self.db
            .with_conn(|conn| notifications::list_notifications(conn, recipient_id, limit, offset))
    }

    pub fn unread_count(&self, recipient_id: i64) -> Result<i64> {
        self.db.with_conn(|conn| notifications::unread_count(conn, recipient_id))
    }

    pub fn unseen_count(&self, recipient_id: i64) -> Result<i64> {
        self.db.with_conn(|conn| notifications::unseen_count(conn, recipient_id))
    }

    pub fn counts(&self, recipient_id: i64) -> Result<Counts> {
        self.db.with_conn(|conn| {
            Ok(Counts {
                unread: notifications::unread_count(conn, recipient_id)?,
                unseen: notifications::unseen_count(conn, recipient_id)?,
            })
        })
    }

    /// Mark everything read (and therefore seen); returns rows changed
    pub fn mark_all_read(&self, recipient_id: i64) -> Result<usize> {
        self.db.with_conn(|conn| notifications::mark_all_read(conn, recipient_id))
    }

    pub fn mark_all_seen(&self, recipient_id: i64) -> Result<usize> {
        self.db.with_conn(|conn| notifications::mark_all_seen(conn, recipient_id))
    }

    /// Mark the Reply rows of one claim thread read
    pub fn mark_thread_read(&self, recipient_id: i64, claim_id: i64) -> Result<usize> {
        self.db
            .with_conn(|conn| notifications::mark_thread_read(conn, recipient_id, claim_id))
    }

    // =========================================================================
    // Devices
    // =========================================================================

    pub fn register_device(&self, device: &Device) -> Result<bool> {
        self.db.with_conn(|conn| devices::register_device(conn, device))
    }

    pub fn unregister_device(&self, device: &Device) -> Result<bool> {
        self.db.with_conn(|conn| devices::unregister_device(conn, device))
    }
}
