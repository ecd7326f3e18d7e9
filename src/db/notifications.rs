//! Inbox rows: append, counters and read-state transitions
//!
//! Flags only ever move false -> true. Every update that sets `read` also
//! sets `seen`, so `read => seen` holds for every row at every observation.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::notification::{Meta, NotificationKind, NotificationRecord, PlannedNotification};
use crate::types::{HeraldError, Result};

const SELECT_COLUMNS: &str = "SELECT id, user_profile_id, address, sender_profile_id, type, message,
    action, type_id, meta, source_event, timestamp, read, seen, created_at
    FROM notification_events";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRecord> {
    let code: i64 = row.get(4)?;
    let kind = NotificationKind::from_code(code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Integer,
            format!("unknown notification type {}", code).into(),
        )
    })?;
    let meta_json: String = row.get(8)?;
    let meta: Meta = serde_json::from_str(&meta_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let timestamp: String = row.get(10)?;
    let created_at: String = row.get(13)?;

    Ok(NotificationRecord {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        address: row.get(2)?,
        sender_id: row.get(3)?,
        kind,
        body: row.get(5)?,
        action: row.get(6)?,
        anchor: row.get(7)?,
        meta,
        source: row.get(9)?,
        timestamp: parse_time(&timestamp),
        read: row.get(11)?,
        seen: row.get(12)?,
        created_at: parse_time(&created_at),
    })
}

/// Append one inbox row with both flags false
pub fn insert_notification(conn: &Connection, planned: &PlannedNotification) -> Result<NotificationRecord> {
    let meta = serde_json::to_string(&planned.meta)
        .map_err(|e| HeraldError::Internal(format!("Failed to encode meta: {}", e)))?;
    let now = now_rfc3339();
    let timestamp = planned.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);

    conn.execute(
        "INSERT INTO notification_events
            (type_id, address, user_profile_id, sender_profile_id, message, action,
             source_event, timestamp, type, meta, read, seen, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
        params![
            planned.anchor,
            planned.recipient.address,
            planned.recipient.id,
            planned.sender.as_ref().map(|s| s.id),
            planned.body,
            planned.action,
            planned.source,
            timestamp,
            planned.kind.code(),
            meta,
            now,
            now,
        ],
    )
    .map_err(|e| HeraldError::Database(format!("Failed to insert notification: {}", e)))?;

    let id = conn.last_insert_rowid();
    get_notification(conn, id)?
        .ok_or_else(|| HeraldError::Database("Failed to retrieve inserted notification".to_string()))
}

pub fn get_notification(conn: &Connection, id: i64) -> Result<Option<NotificationRecord>> {
    let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
    conn.query_row(&sql, params![id], record_from_row)
        .optional()
        .map_err(|e| HeraldError::Database(format!("Failed to get notification: {}", e)))
}

/// Newest-first page of a recipient's inbox
pub fn list_notifications(
    conn: &Connection,
    recipient_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<NotificationRecord>> {
    let sql = format!(
        "{} WHERE user_profile_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| HeraldError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params![recipient_id, limit, offset], record_from_row)
        .map_err(|e| HeraldError::Database(format!("Failed to list notifications: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| HeraldError::Database(format!("Failed to read row: {}", e)))?);
    }
    Ok(results)
}

fn count(conn: &Connection, sql: &str, recipient_id: i64) -> Result<i64> {
    conn.query_row(sql, params![recipient_id], |row| row.get(0))
        .map_err(|e| HeraldError::Database(format!("Count failed: {}", e)))
}

pub fn unread_count(conn: &Connection, recipient_id: i64) -> Result<i64> {
    count(
        conn,
        "SELECT COUNT(*) FROM notification_events WHERE user_profile_id = ? AND read = 0",
        recipient_id,
    )
}

pub fn unseen_count(conn: &Connection, recipient_id: i64) -> Result<i64> {
    count(
        conn,
        "SELECT COUNT(*) FROM notification_events WHERE user_profile_id = ? AND seen = 0",
        recipient_id,
    )
}

pub fn total_count(conn: &Connection, recipient_id: i64) -> Result<i64> {
    count(
        conn,
        "SELECT COUNT(*) FROM notification_events WHERE user_profile_id = ?",
        recipient_id,
    )
}

/// Fresh/Observed -> Acted for every row of the recipient
pub fn mark_all_read(conn: &Connection, recipient_id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE notification_events SET read = 1, seen = 1, updated_at = ?
         WHERE user_profile_id = ? AND (read = 0 OR seen = 0)",
        params![now_rfc3339(), recipient_id],
    )
    .map_err(|e| HeraldError::Database(format!("Failed to mark all read: {}", e)))
}

/// Fresh -> Observed for every row of the recipient
pub fn mark_all_seen(conn: &Connection, recipient_id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE notification_events SET seen = 1, updated_at = ?
         WHERE user_profile_id = ? AND seen = 0",
        params![now_rfc3339(), recipient_id],
    )
    .map_err(|e| HeraldError::Database(format!("Failed to mark all seen: {}", e)))
}

/// Mark the recipient's Reply rows on one claim as read
pub fn mark_thread_read(conn: &Connection, recipient_id: i64, claim_id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE notification_events SET read = 1, seen = 1, updated_at = ?
         WHERE user_profile_id = ? AND type = ? AND read = 0
           AND json_extract(meta, '$.claim_id') = ?",
        params![
            now_rfc3339(),
            recipient_id,
            NotificationKind::Reply.code(),
            claim_id
        ],
    )
    .map_err(|e| HeraldError::Database(format!("Failed to mark thread read: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::directory::Account;

    fn planned(recipient_id: i64, kind: NotificationKind, claim_id: i64) -> PlannedNotification {
        PlannedNotification {
            source: format!("test-{}", claim_id),
            recipient: Account {
                id: recipient_id,
                handle: format!("user{}", recipient_id),
                address: format!("cosmos1user{}", recipient_id),
            },
            sender: None,
            kind,
            body: "body".to_string(),
            action: "Replied".to_string(),
            anchor: claim_id,
            meta: Meta::claim(claim_id),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_insert_initializes_flags() {
        let db = Database::open_in_memory().unwrap();
        let record = db
            .with_conn(|conn| insert_notification(conn, &planned(1, NotificationKind::Mention, 42)))
            .unwrap();

        assert!(record.id > 0);
        assert!(!record.read);
        assert!(!record.seen);
        assert_eq!(record.kind, NotificationKind::Mention);
        assert_eq!(record.meta.claim_id, Some(42));
        assert_eq!(record.address, "cosmos1user1");
    }

    #[test]
    fn test_ids_are_monotonic() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let a = insert_notification(conn, &planned(1, NotificationKind::Reply, 1))?;
            let b = insert_notification(conn, &planned(1, NotificationKind::Reply, 1))?;
            assert!(b.id > a.id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_all_seen_keeps_unread() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_notification(conn, &planned(1, NotificationKind::Reply, 1))?;
            insert_notification(conn, &planned(1, NotificationKind::Mention, 2))?;
            insert_notification(conn, &planned(2, NotificationKind::Reply, 1))?;

            assert_eq!(mark_all_seen(conn, 1)?, 2);
            assert_eq!(unseen_count(conn, 1)?, 0);
            assert_eq!(unread_count(conn, 1)?, 2);
            // Other recipients untouched
            assert_eq!(unseen_count(conn, 2)?, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_all_read_implies_seen_and_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_notification(conn, &planned(1, NotificationKind::Reply, 1))?;
            insert_notification(conn, &planned(1, NotificationKind::AgreeReceived, 2))?;

            assert_eq!(mark_all_read(conn, 1)?, 2);
            assert_eq!(unread_count(conn, 1)?, 0);
            assert_eq!(unseen_count(conn, 1)?, 0);
            assert_eq!(total_count(conn, 1)?, 2);

            assert_eq!(mark_all_read(conn, 1)?, 0);
            assert_eq!(unread_count(conn, 1)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_thread_read_only_touches_replies_on_claim() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_notification(conn, &planned(1, NotificationKind::Reply, 42))?;
            let mention = insert_notification(conn, &planned(1, NotificationKind::Mention, 42))?;
            let other = insert_notification(conn, &planned(1, NotificationKind::Reply, 43))?;

            assert_eq!(mark_thread_read(conn, 1, 42)?, 1);

            let mention = get_notification(conn, mention.id)?.unwrap();
            assert!(!mention.read && !mention.seen);
            let other = get_notification(conn, other.id)?.unwrap();
            assert!(!other.read);
            assert_eq!(unread_count(conn, 1)?, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_is_newest_first() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            for claim in 1..=3 {
                insert_notification(conn, &planned(1, NotificationKind::Reply, claim))?;
            }
            let page = list_notifications(conn, 1, 2, 0)?;
            assert_eq!(page.iter().map(|n| n.anchor).collect::<Vec<_>>(), vec![3, 2]);
            let rest = list_notifications(conn, 1, 2, 2)?;
            assert_eq!(rest.len(), 1);
            Ok(())
        })
        .unwrap();
    }
}
