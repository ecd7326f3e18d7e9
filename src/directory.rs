//! Read-only view of platform data the planner needs
//!
//! Accounts, claims, arguments and comments are created by other parts of
//! the platform. The dispatcher only looks them up, so the seam is a trait:
//! the production implementation reads the shared SQLite database
//! ([`crate::db::SqliteDirectory`]), tests can seed the same tables in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Result;

/// A platform account as seen by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Display handle, stored lowercase
    pub handle: String,
    /// On-chain address
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: i64,
    /// Creator address
    pub creator: String,
    pub body: String,
}

/// An argument on a claim; also the payload of `create-argument` chain events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    #[serde(deserialize_with = "crate::chain::types::de_i64")]
    pub id: i64,
    #[serde(deserialize_with = "crate::chain::types::de_i64")]
    pub claim_id: i64,
    /// Creator address
    pub creator: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub claim_id: i64,
    pub argument_id: Option<i64>,
    pub element_id: Option<i64>,
    /// Creator address
    pub creator: String,
    pub body: String,
}

/// The discussion a reply belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyScope {
    pub claim_id: i64,
    pub argument_id: Option<i64>,
    pub element_id: Option<i64>,
}

impl ReplyScope {
    pub fn is_claim_level(&self) -> bool {
        self.argument_id.is_none() && self.element_id.is_none()
    }
}

/// Read-only queries against platform data
#[async_trait]
pub trait Directory: Send + Sync {
    async fn account_by_id(&self, id: i64) -> Result<Option<Account>>;

    /// Case-insensitive handle lookup
    async fn account_by_handle(&self, handle: &str) -> Result<Option<Account>>;

    async fn account_by_address(&self, address: &str) -> Result<Option<Account>>;

    async fn claim(&self, id: i64) -> Result<Option<Claim>>;

    async fn argument(&self, id: i64) -> Result<Option<Argument>>;

    async fn comment(&self, id: i64) -> Result<Option<Comment>>;

    /// Addresses of everyone who argued or staked on a claim, first-seen order
    async fn claim_participants(&self, claim_id: i64) -> Result<Vec<String>>;

    /// Addresses of everyone who commented in a scope, first-seen order
    async fn reply_participants(&self, scope: &ReplyScope) -> Result<Vec<String>>;

    /// The currently featured claim, if any
    async fn featured_claim(&self) -> Result<Option<Claim>>;

    /// Accounts with `id > after_id`, ascending, at most `limit`
    async fn accounts_page(&self, after_id: i64, limit: usize) -> Result<Vec<Account>>;
}
