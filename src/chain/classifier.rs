//! Event classifier - maps raw chain events to semantic events
//!
//! Transactions are recognized by tag value, end-block events by tag key.
//! Unknown actions and keys are ignored; a payload that fails to decode
//! drops only that event.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{ChainEvent, ExpiredStake, SlashResult, Stake};
use crate::directory::Argument;
use crate::events::{EventEnvelope, SemanticEvent};

/// Tx action: a new argument was written
pub const CREATE_ARGUMENT: &str = "create-argument";
/// Tx action: someone agreed with an argument
pub const CREATE_UPVOTE: &str = "create-upvote";
/// Tx action: an argument was slashed by moderators
pub const SLASH_ARGUMENT: &str = "slash-argument";
/// End-block key: stakes whose period ended, with settlement results
pub const EXPIRED_STAKES: &str = "expired-stakes";
/// End-block key: accounts released from jail
pub const UNJAILED_ACCOUNTS: &str = "unjailed-accounts";

/// Classify one chain event into zero or more semantic events
pub fn classify(event: &ChainEvent) -> Vec<EventEnvelope> {
    match event {
        ChainEvent::Tx {
            height,
            index,
            tags,
            payload,
        } => {
            let mut actions: Vec<&str> = Vec::new();
            for tag in tags {
                let value = tag.value.as_str();
                if matches!(value, CREATE_ARGUMENT | CREATE_UPVOTE | SLASH_ARGUMENT)
                    && !actions.contains(&value)
                {
                    actions.push(value);
                }
            }

            actions
                .into_iter()
                .filter_map(|action| {
                    let id = format!("tx-{}-{}-{}", height, index, action);
                    let event = match action {
                        CREATE_ARGUMENT => {
                            decode::<Argument>(action, payload).map(SemanticEvent::ArgumentCreated)
                        }
                        CREATE_UPVOTE => decode::<Stake>(action, payload).map(SemanticEvent::UpvoteCast),
                        _ => decode::<SlashResult>(action, payload).map(SemanticEvent::ArgumentSlashed),
                    }?;
                    Some(EventEnvelope::new(id, event))
                })
                .collect()
        }
        ChainEvent::BlockEnd { height, tags } => {
            let mut envelopes = Vec::new();

            for tag in tags {
                match tag.key.as_str() {
                    EXPIRED_STAKES => {
                        let Some(stakes) = decode::<Vec<ExpiredStake>>(EXPIRED_STAKES, tag.value.as_bytes())
                        else {
                            continue;
                        };
                        for stake in stakes {
                            if stake.result.is_none() {
                                debug!(stake_id = stake.id, "Expired stake has no reward result, skipping");
                                continue;
                            }
                            envelopes.push(EventEnvelope::new(
                                format!("block-{}-stake-{}", height, stake.id),
                                SemanticEvent::StakeRewardSettled(stake),
                            ));
                        }
                    }
                    UNJAILED_ACCOUNTS => {
                        let Some(addresses) = decode::<Vec<String>>(UNJAILED_ACCOUNTS, tag.value.as_bytes())
                        else {
                            continue;
                        };
                        if !addresses.is_empty() {
                            envelopes.push(EventEnvelope::new(
                                format!("block-{}-unjailed", height),
                                SemanticEvent::AccountsUnjailed(addresses),
                            ));
                        }
                    }
                    _ => {}
                }
            }

            envelopes
        }
    }
}

fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Option<T> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(kind = what, error = %e, "Failed to decode chain payload, dropping event");
            None
        }
    }
}
