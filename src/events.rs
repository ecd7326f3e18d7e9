//! Semantic events: the classifier's and the webhooks' common output
//!
//! Everything downstream of ingress (planner, inbox, push) sees only
//! [`EventEnvelope`]s, regardless of whether the event came from the chain
//! or from an HTTP webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chain::types::{de_i64, de_opt_i64, ExpiredStake, SlashResult, Stake};
use crate::directory::{Argument, ReplyScope};
use crate::types::HeraldError;

/// A reply posted in a discussion (webhook `/sendCommentNotification`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPosted {
    #[serde(deserialize_with = "de_i64")]
    pub id: i64,
    #[serde(deserialize_with = "de_i64")]
    pub claim_id: i64,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub argument_id: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub element_id: Option<i64>,
    /// Author address
    pub creator: String,
    /// Claim creator address, when the caller already knows it
    #[serde(default)]
    pub claim_creator: Option<String>,
    /// Argument creator address, when the caller already knows it
    #[serde(default)]
    pub argument_creator: Option<String>,
    /// When the reply was posted; defaults to arrival time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReplyPosted {
    pub fn scope(&self) -> ReplyScope {
        ReplyScope {
            claim_id: self.claim_id,
            argument_id: self.argument_id,
            element_id: self.element_id,
        }
    }
}

/// Currency of an off-chain reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardType {
    Invite,
    Tru,
}

impl FromStr for RewardType {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "invite" => Ok(Self::Invite),
            "tru" => Ok(Self::Tru),
            other => Err(HeraldError::BadRequest(format!("unsupported reward type: {}", other))),
        }
    }
}

impl fmt::Display for RewardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invite => f.write_str("invite"),
            Self::Tru => f.write_str("tru"),
        }
    }
}

/// Body of the `/sendRewardNotification` webhook as sent by the platform
#[derive(Debug, Clone, Deserialize)]
pub struct RewardRequest {
    #[serde(deserialize_with = "de_i64")]
    pub rewardee_id: i64,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub causer_id: Option<i64>,
    pub reward_type: String,
    pub reward_amount: String,
    #[serde(default)]
    pub causer_action: Option<String>,
}

/// A validated off-chain reward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardUnlocked {
    pub rewardee_id: i64,
    pub causer_id: Option<i64>,
    pub reward_type: RewardType,
    /// Invite count, or TRU in base units
    pub amount: u64,
    pub causer_action: Option<String>,
}

impl TryFrom<RewardRequest> for RewardUnlocked {
    type Error = HeraldError;

    fn try_from(req: RewardRequest) -> Result<Self, Self::Error> {
        let reward_type: RewardType = req.reward_type.parse()?;
        let amount = req.reward_amount.trim().parse::<u64>().map_err(|_| {
            HeraldError::BadRequest(format!("reward_amount is not a whole number: {}", req.reward_amount))
        })?;

        Ok(Self {
            rewardee_id: req.rewardee_id,
            causer_id: req.causer_id,
            reward_type,
            amount,
            causer_action: req.causer_action.filter(|a| !a.trim().is_empty()),
        })
    }
}

/// What a broadcast is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    FeaturedClaim,
}

impl BroadcastKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::FeaturedClaim),
            _ => None,
        }
    }
}

/// Body of the `/sendBroadcastNotification` webhook
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type", deserialize_with = "de_i64")]
    pub kind: i64,
}

impl TryFrom<BroadcastRequest> for BroadcastKind {
    type Error = HeraldError;

    fn try_from(req: BroadcastRequest) -> Result<Self, Self::Error> {
        Self::from_code(req.kind)
            .ok_or_else(|| HeraldError::BadRequest(format!("unknown broadcast type: {}", req.kind)))
    }
}

/// Domain event the planner understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticEvent {
    ArgumentCreated(Argument),
    UpvoteCast(Stake),
    StakeRewardSettled(ExpiredStake),
    ArgumentSlashed(SlashResult),
    AccountsUnjailed(Vec<String>),
    ReplyPosted(ReplyPosted),
    RewardUnlocked(RewardUnlocked),
    BroadcastRequested(BroadcastKind),
}

impl SemanticEvent {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::ArgumentCreated(_) => "argument_created",
            Self::UpvoteCast(_) => "upvote_cast",
            Self::StakeRewardSettled(_) => "stake_reward_settled",
            Self::ArgumentSlashed(_) => "argument_slashed",
            Self::AccountsUnjailed(_) => "accounts_unjailed",
            Self::ReplyPosted(_) => "reply_posted",
            Self::RewardUnlocked(_) => "reward_unlocked",
            Self::BroadcastRequested(_) => "broadcast_requested",
        }
    }
}

/// A semantic event with its identity and arrival time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Stable identifier; all notifications of one event share it
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub event: SemanticEvent,
}

impl EventEnvelope {
    pub fn new(id: impl Into<String>, event: SemanticEvent) -> Self {
        Self {
            id: id.into(),
            received_at: Utc::now(),
            event,
        }
    }

    /// Envelope for an event that arrived over HTTP
    pub fn from_webhook(event: SemanticEvent) -> Self {
        Self::new(format!("webhook-{}", uuid::Uuid::new_v4()), event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward_request(reward_type: &str, amount: &str) -> RewardRequest {
        RewardRequest {
            rewardee_id: 1,
            causer_id: Some(2),
            reward_type: reward_type.to_string(),
            reward_amount: amount.to_string(),
            causer_action: Some("joined".to_string()),
        }
    }

    #[test]
    fn test_reward_validation() {
        let reward = RewardUnlocked::try_from(reward_request("TRU", "1500000")).unwrap();
        assert_eq!(reward.reward_type, RewardType::Tru);
        assert_eq!(reward.amount, 1_500_000);

        assert!(RewardUnlocked::try_from(reward_request("gold", "1")).is_err());
        assert!(RewardUnlocked::try_from(reward_request("invite", "two")).is_err());
    }

    #[test]
    fn test_reply_accepts_string_ids() {
        let reply: ReplyPosted = serde_json::from_str(
            r#"{"id": "9", "claim_id": "42", "argument_id": null, "creator": "cosmos1carol"}"#,
        )
        .unwrap();
        assert_eq!(reply.id, 9);
        assert!(reply.scope().is_claim_level());
    }

    #[test]
    fn test_broadcast_kind() {
        let req: BroadcastRequest = serde_json::from_str(r#"{"type": 0}"#).unwrap();
        assert_eq!(BroadcastKind::try_from(req).unwrap(), BroadcastKind::FeaturedClaim);

        let req: BroadcastRequest = serde_json::from_str(r#"{"type": 5}"#).unwrap();
        assert!(BroadcastKind::try_from(req).is_err());
    }
}
