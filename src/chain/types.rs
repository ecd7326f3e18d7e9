//! Chain event and payload types
//!
//! Cosmos-style chains encode 64-bit integers as JSON strings, so every
//! numeric payload field accepts either form.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// One key/value tag attached to a chain event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Raw event delivered by the chain subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// Result of a delivered transaction
    Tx {
        height: i64,
        index: u32,
        tags: Vec<Tag>,
        payload: Vec<u8>,
    },
    /// End-of-block events
    BlockEnd { height: i64, tags: Vec<Tag> },
}

impl ChainEvent {
    pub fn tags(&self) -> &[Tag] {
        match self {
            Self::Tx { tags, .. } | Self::BlockEnd { tags, .. } => tags,
        }
    }

    pub fn height(&self) -> i64 {
        match self {
            Self::Tx { height, .. } | Self::BlockEnd { height, .. } => *height,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Str(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UintOrString {
    Uint(u64),
    Str(String),
}

/// Deserialize an i64 written as a number or a decimal string
pub fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(v) => Ok(v),
        IntOrString::Str(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

/// Optional variant of [`de_i64`]; use with `#[serde(default)]`
pub fn de_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<IntOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntOrString::Int(v)) => Ok(Some(v)),
        Some(IntOrString::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(IntOrString::Str(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
    }
}

fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match UintOrString::deserialize(deserializer)? {
        UintOrString::Uint(v) => Ok(v),
        UintOrString::Str(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

/// Amount of a denomination in base units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    #[serde(default)]
    pub denom: String,
    #[serde(deserialize_with = "de_u64")]
    pub amount: u64,
}

/// Payload of `create-upvote`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    #[serde(deserialize_with = "de_i64")]
    pub id: i64,
    #[serde(deserialize_with = "de_i64")]
    pub argument_id: i64,
    /// Staker address
    pub creator: String,
    #[serde(default)]
    pub amount: Coin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardResultType {
    /// The staker wrote the argument
    #[serde(alias = "argument_created", alias = "authorship")]
    ArgumentCreation,
    /// The staker agreed with someone else's argument
    #[serde(alias = "upvote_created", alias = "upvote_creation")]
    Upvote,
}

/// How an expired stake was settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardResult {
    #[serde(rename = "type")]
    pub kind: RewardResultType,
    #[serde(default)]
    pub argument_creator: String,
    #[serde(default)]
    pub argument_creator_reward: Coin,
    #[serde(default)]
    pub stake_creator: String,
    #[serde(default)]
    pub stake_creator_reward: Coin,
}

/// Entry of the `expired-stakes` end-block tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredStake {
    #[serde(deserialize_with = "de_i64")]
    pub id: i64,
    #[serde(deserialize_with = "de_i64")]
    pub argument_id: i64,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub claim_id: Option<i64>,
    /// Staker address
    pub creator: String,
    #[serde(default)]
    pub amount: Coin,
    #[serde(default)]
    pub result: Option<RewardResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punishment {
    pub address: String,
    #[serde(default)]
    pub amount: Coin,
}

/// Payload of `slash-argument`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashResult {
    #[serde(deserialize_with = "de_i64")]
    pub argument_id: i64,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub claim_id: Option<i64>,
    #[serde(default)]
    pub punished: Vec<Punishment>,
    #[serde(default)]
    pub jailed: Vec<String>,
}
