//! Broadcast fan-out
//!
//! A broadcast is the one plan with no upper bound on recipients. It is
//! expanded page by page into the same bounded queue every other event
//! uses, so a large account table never starves real-time notifications.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::PlanBatch;
use crate::directory::{Account, Directory};
use crate::notification::{Meta, NotificationKind, PlannedNotification};
use crate::types::{HeraldError, Result};

/// Everything but the recipient of a broadcast notification
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastPlan {
    pub source: String,
    pub kind: NotificationKind,
    pub body: String,
    pub action: String,
    pub anchor: i64,
    pub meta: Meta,
    pub timestamp: DateTime<Utc>,
}

impl BroadcastPlan {
    pub fn notification_for(&self, recipient: Account) -> PlannedNotification {
        PlannedNotification {
            source: self.source.clone(),
            recipient,
            sender: None,
            kind: self.kind,
            body: self.body.clone(),
            action: self.action.clone(),
            anchor: self.anchor,
            meta: self.meta.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Page through every account and enqueue one batch per page
///
/// Returns the number of notifications enqueued.
pub async fn expand_broadcast(
    directory: &dyn Directory,
    plan: &BroadcastPlan,
    chunk_size: usize,
    sink: &mpsc::Sender<PlanBatch>,
) -> Result<usize> {
    let chunk_size = chunk_size.max(1);
    let mut after_id = 0;
    let mut total = 0;

    loop {
        let page = directory.accounts_page(after_id, chunk_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        after_id = last.id;
        let page_len = page.len();

        let batch = PlanBatch {
            source: plan.source.clone(),
            notifications: page.into_iter().map(|account| plan.notification_for(account)).collect(),
        };
        // Blocks while the inbox queue is full; other events interleave here
        sink.send(batch)
            .await
            .map_err(|_| HeraldError::QueueClosed("planned notification queue".to_string()))?;
        total += page_len;
        debug!(event_id = %plan.source, after_id, total, "Broadcast chunk enqueued");

        if page_len < chunk_size {
            break;
        }
        tokio::task::yield_now().await;
    }

    info!(event_id = %plan.source, recipients = total, "Broadcast expanded");
    Ok(total)
}
