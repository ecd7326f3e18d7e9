//! Directory lookups over the platform tables

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Database;
use crate::directory::{Account, Argument, Claim, Comment, Directory, ReplyScope};
use crate::types::{HeraldError, Result};

/// [`Directory`] backed by the shared SQLite database
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Arc<Database>,
}

impl SqliteDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let handle: String = row.get(1)?;
    Ok(Account {
        id: row.get(0)?,
        handle: handle.to_lowercase(),
        address: row.get(2)?,
    })
}

fn query_account(conn: &Connection, sql: &str, param: &dyn rusqlite::ToSql) -> Result<Option<Account>> {
    conn.query_row(sql, [param], account_from_row)
        .optional()
        .map_err(|e| HeraldError::Database(format!("Failed to look up account: {}", e)))
}

/// Collect a column of addresses, keeping first occurrence order
fn distinct_addresses(rows: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|address| seen.insert(address.clone()))
        .collect()
}

fn collect_addresses(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| HeraldError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .map_err(|e| HeraldError::Database(format!("Failed to query participants: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| HeraldError::Database(format!("Failed to read row: {}", e)))?);
    }
    Ok(results)
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn account_by_id(&self, id: i64) -> Result<Option<Account>> {
        self.db.with_conn(|conn| {
            query_account(conn, "SELECT id, username, address FROM accounts WHERE id = ?", &id)
        })
    }

    async fn account_by_handle(&self, handle: &str) -> Result<Option<Account>> {
        let handle = handle.to_lowercase();
        self.db.with_conn(|conn| {
            query_account(
                conn,
                "SELECT id, username, address FROM accounts WHERE username = ? COLLATE NOCASE",
                &handle,
            )
        })
    }

    async fn account_by_address(&self, address: &str) -> Result<Option<Account>> {
        self.db.with_conn(|conn| {
            query_account(conn, "SELECT id, username, address FROM accounts WHERE address = ?", &address)
        })
    }

    async fn claim(&self, id: i64) -> Result<Option<Claim>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, creator, body FROM claims WHERE id = ?",
                params![id],
                |row| {
                    Ok(Claim {
                        id: row.get(0)?,
                        creator: row.get(1)?,
                        body: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| HeraldError::Database(format!("Failed to get claim: {}", e)))
        })
    }

    async fn argument(&self, id: i64) -> Result<Option<Argument>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, claim_id, creator, body, summary FROM arguments WHERE id = ?",
                params![id],
                |row| {
                    Ok(Argument {
                        id: row.get(0)?,
                        claim_id: row.get(1)?,
                        creator: row.get(2)?,
                        body: row.get(3)?,
                        summary: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(|e| HeraldError::Database(format!("Failed to get argument: {}", e)))
        })
    }

    async fn comment(&self, id: i64) -> Result<Option<Comment>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, claim_id, argument_id, element_id, creator, body FROM comments WHERE id = ?",
                params![id],
                |row| {
                    Ok(Comment {
                        id: row.get(0)?,
                        claim_id: row.get(1)?,
                        argument_id: row.get(2)?,
                        element_id: row.get(3)?,
                        creator: row.get(4)?,
                        body: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(|e| HeraldError::Database(format!("Failed to get comment: {}", e)))
        })
    }

    async fn claim_participants(&self, claim_id: i64) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut addresses = collect_addresses(
                conn,
                "SELECT creator FROM arguments WHERE claim_id = ? ORDER BY id",
                &[&claim_id],
            )?;
            addresses.extend(collect_addresses(
                conn,
                "SELECT s.creator FROM stakes s
                 JOIN arguments a ON a.id = s.argument_id
                 WHERE a.claim_id = ? ORDER BY s.id",
                &[&claim_id],
            )?);
            Ok(distinct_addresses(addresses))
        })
    }

    async fn reply_participants(&self, scope: &ReplyScope) -> Result<Vec<String>> {
        // `IS` matches NULL scopes as equal
        let scope = *scope;
        self.db.with_conn(|conn| {
            let addresses = collect_addresses(
                conn,
                "SELECT creator FROM comments
                 WHERE claim_id = ? AND argument_id IS ? AND element_id IS ?
                 ORDER BY id",
                &[&scope.claim_id, &scope.argument_id, &scope.element_id],
            )?;
            Ok(distinct_addresses(addresses))
        })
    }

    async fn featured_claim(&self) -> Result<Option<Claim>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT c.id, c.creator, c.body FROM featured_claims f
                 JOIN claims c ON c.id = f.claim_id
                 ORDER BY f.id DESC LIMIT 1",
                [],
                |row| {
                    Ok(Claim {
                        id: row.get(0)?,
                        creator: row.get(1)?,
                        body: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| HeraldError::Database(format!("Failed to get featured claim: {}", e)))
        })
    }

    async fn accounts_page(&self, after_id: i64, limit: usize) -> Result<Vec<Account>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, username, address FROM accounts WHERE id > ? ORDER BY id LIMIT ?")
                .map_err(|e| HeraldError::Database(format!("Failed to prepare statement: {}", e)))?;

            let rows = stmt
                .query_map(params![after_id, limit as i64], account_from_row)
                .map_err(|e| HeraldError::Database(format!("Failed to list accounts: {}", e)))?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row.map_err(|e| HeraldError::Database(format!("Failed to read row: {}", e)))?);
            }
            Ok(results)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteDirectory {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO accounts (id, username, address) VALUES
                    (1, 'Alice', 'cosmos1alice'), (2, 'bob', 'cosmos1bob'), (3, 'carol', 'cosmos1carol');
                 INSERT INTO claims (id, creator, body) VALUES (42, 'cosmos1bob', 'Water is wet');
                 INSERT INTO arguments (id, claim_id, creator, body) VALUES
                    (10, 42, 'cosmos1carol', 'yes'), (11, 42, 'cosmos1alice', 'no'), (12, 42, 'cosmos1carol', 'again');
                 INSERT INTO stakes (id, argument_id, creator) VALUES (1, 10, 'cosmos1bob'), (2, 11, 'cosmos1carol');
                 INSERT INTO comments (id, claim_id, argument_id, element_id, creator, body) VALUES
                    (1, 42, NULL, NULL, 'cosmos1alice', 'first'),
                    (2, 42, 10, NULL, 'cosmos1bob', 'on argument'),
                    (3, 42, NULL, NULL, 'cosmos1carol', 'second'),
                    (4, 42, NULL, NULL, 'cosmos1alice', 'third');
                 INSERT INTO featured_claims (claim_id) VALUES (42);",
            )?;
            Ok(())
        })
        .unwrap();
        SqliteDirectory::new(db)
    }

    #[tokio::test]
    async fn test_handle_lookup_is_case_insensitive() {
        let dir = seeded();
        let alice = dir.account_by_handle("ALICE").await.unwrap().unwrap();
        assert_eq!(alice.id, 1);
        assert_eq!(alice.handle, "alice");
        assert!(dir.account_by_handle("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_participants_first_seen_order() {
        let dir = seeded();
        let participants = dir.claim_participants(42).await.unwrap();
        assert_eq!(participants, vec!["cosmos1carol", "cosmos1alice", "cosmos1bob"]);
    }

    #[tokio::test]
    async fn test_reply_participants_by_scope() {
        let dir = seeded();
        let claim_level = ReplyScope {
            claim_id: 42,
            argument_id: None,
            element_id: None,
        };
        assert_eq!(
            dir.reply_participants(&claim_level).await.unwrap(),
            vec!["cosmos1alice", "cosmos1carol"]
        );

        let argument_level = ReplyScope {
            argument_id: Some(10),
            ..claim_level
        };
        assert_eq!(dir.reply_participants(&argument_level).await.unwrap(), vec!["cosmos1bob"]);
    }

    #[tokio::test]
    async fn test_accounts_page_is_keyset() {
        let dir = seeded();
        let first = dir.accounts_page(0, 2).await.unwrap();
        assert_eq!(first.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 2]);
        let rest = dir.accounts_page(2, 2).await.unwrap();
        assert_eq!(rest.iter().map(|a| a.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_featured_claim() {
        let dir = seeded();
        let claim = tokio_test::block_on(dir.featured_claim()).unwrap().unwrap();
        assert_eq!(claim.id, 42);
        assert_eq!(claim.body, "Water is wet");
    }
}
