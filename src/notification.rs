//! Notification model shared by the planner, inbox and push stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::directory::Account;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    Reply,
    Mention,
    NewArgumentOnClaim,
    AgreeReceived,
    StakeEarned,
    RewardUnlocked,
    FeaturedBroadcast,
    Slashed,
    Jailed,
    Unjailed,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 10] = [
        Self::Reply,
        Self::Mention,
        Self::NewArgumentOnClaim,
        Self::AgreeReceived,
        Self::StakeEarned,
        Self::RewardUnlocked,
        Self::FeaturedBroadcast,
        Self::Slashed,
        Self::Jailed,
        Self::Unjailed,
    ];

    /// Stable integer code stored in `notification_events.type`
    pub fn code(self) -> i64 {
        match self {
            Self::Reply => 0,
            Self::Mention => 1,
            Self::NewArgumentOnClaim => 2,
            Self::AgreeReceived => 3,
            Self::StakeEarned => 4,
            Self::RewardUnlocked => 5,
            Self::FeaturedBroadcast => 6,
            Self::Slashed => 7,
            Self::Jailed => 8,
            Self::Unjailed => 9,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reply => "Reply",
            Self::Mention => "Mention",
            Self::NewArgumentOnClaim => "NewArgumentOnClaim",
            Self::AgreeReceived => "AgreeReceived",
            Self::StakeEarned => "StakeEarned",
            Self::RewardUnlocked => "RewardUnlocked",
            Self::FeaturedBroadcast => "FeaturedBroadcast",
            Self::Slashed => "Slashed",
            Self::Jailed => "Jailed",
            Self::Unjailed => "Unjailed",
        }
    }

    /// Push title shown above the body
    pub fn title(self) -> &'static str {
        match self {
            Self::Reply => "New Reply",
            Self::Mention => "You were mentioned",
            Self::NewArgumentOnClaim => "New Argument",
            Self::AgreeReceived => "Someone agreed with you",
            Self::StakeEarned => "Stake Earned",
            Self::RewardUnlocked => "Reward Unlocked",
            Self::FeaturedBroadcast => "Featured Debate",
            Self::Slashed => "Stake Slashed",
            Self::Jailed => "Account Jailed",
            Self::Unjailed => "Account Unjailed",
        }
    }

    /// Icon file name under the asset base URL
    pub fn icon(self) -> &'static str {
        match self {
            Self::Reply | Self::Mention => "notification_comment.png",
            Self::NewArgumentOnClaim | Self::AgreeReceived => "notification_argument.png",
            Self::StakeEarned | Self::RewardUnlocked => "notification_reward.png",
            Self::FeaturedBroadcast => "notification_featured.png",
            Self::Slashed | Self::Jailed | Self::Unjailed => "notification_moderation.png",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown notification kind: {}", s))
    }
}

/// Where a mention was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
    Argument,
    Comment,
}

/// Identifiers a notification points at, stored as JSON in `meta`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_type: Option<MentionKind>,
}

impl Meta {
    pub fn claim(claim_id: i64) -> Self {
        Self {
            claim_id: Some(claim_id),
            ..Default::default()
        }
    }

    pub fn argument(claim_id: i64, argument_id: i64) -> Self {
        Self {
            claim_id: Some(claim_id),
            argument_id: Some(argument_id),
            ..Default::default()
        }
    }
}

/// One notification the planner wants written and pushed
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNotification {
    /// Identifier of the source event (dedup scope)
    pub source: String,
    pub recipient: Account,
    pub sender: Option<Account>,
    pub kind: NotificationKind,
    pub body: String,
    pub action: String,
    pub anchor: i64,
    pub meta: Meta,
    pub timestamp: DateTime<Utc>,
}

/// A persisted inbox row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub recipient_id: i64,
    pub address: String,
    pub sender_id: Option<i64>,
    pub kind: NotificationKind,
    pub body: String,
    pub action: String,
    pub anchor: i64,
    pub meta: Meta,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}
