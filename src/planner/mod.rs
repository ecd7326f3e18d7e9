//! Recipient planner
//!
//! Turns one [`EventEnvelope`] into the ordered list of notifications to
//! write. Within one event a recipient is notified at most once, mentions
//! are emitted before generic notifications, and the author of the event
//! never notifies themselves. Planning never fails: lookup misses and
//! lookup errors drop the affected recipient only.

pub mod amount;
pub mod broadcast;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub use amount::{format_amount, format_amount_with_decimals, COIN_DECIMALS};
pub use broadcast::{expand_broadcast, BroadcastPlan};

use crate::chain::types::{ExpiredStake, RewardResultType, SlashResult, Stake};
use crate::directory::{Account, Argument, Directory};
use crate::events::{BroadcastKind, EventEnvelope, ReplyPosted, RewardType, RewardUnlocked, SemanticEvent};
use crate::mention::MentionResolver;
use crate::notification::{MentionKind, Meta, NotificationKind, PlannedNotification};

/// Longest argument excerpt used when an argument has no summary
const EXCERPT_CHARS: usize = 140;

/// The notifications of one event, moved through the pipeline together
#[derive(Debug, Clone, PartialEq)]
pub struct PlanBatch {
    pub source: String,
    pub notifications: Vec<PlannedNotification>,
}

/// What the planner decided for one event
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Notifications(Vec<PlannedNotification>),
    /// Every account; expanded in chunks by [`expand_broadcast`]
    Broadcast(BroadcastPlan),
}

impl Plan {
    /// Planned notifications, empty for broadcasts
    pub fn notifications(&self) -> &[PlannedNotification] {
        match self {
            Self::Notifications(list) => list,
            Self::Broadcast(_) => &[],
        }
    }
}

/// Accumulates one event's notifications and enforces per-event dedup
struct PlanBuilder {
    source: String,
    timestamp: DateTime<Utc>,
    author_address: Option<String>,
    sender: Option<Account>,
    notified: HashSet<i64>,
    out: Vec<PlannedNotification>,
}

impl PlanBuilder {
    fn new(envelope: &EventEnvelope, author_address: Option<&str>, sender: Option<Account>) -> Self {
        Self {
            source: envelope.id.clone(),
            timestamp: envelope.received_at,
            author_address: author_address.map(str::to_string),
            sender,
            notified: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn is_author(&self, recipient: &Account) -> bool {
        self.author_address.as_deref() == Some(recipient.address.as_str())
            || self.sender.as_ref().map(|s| s.id) == Some(recipient.id)
    }

    /// Add a notification unless the recipient is the author or already notified
    fn emit(
        &mut self,
        recipient: Account,
        kind: NotificationKind,
        body: impl Into<String>,
        action: &str,
        anchor: i64,
        meta: Meta,
    ) -> bool {
        if self.is_author(&recipient) {
            debug!(event_id = %self.source, recipient = recipient.id, "Skipping self-notification");
            return false;
        }
        if !self.notified.insert(recipient.id) {
            return false;
        }

        self.out.push(PlannedNotification {
            source: self.source.clone(),
            recipient,
            sender: self.sender.clone(),
            kind,
            body: body.into(),
            action: action.to_string(),
            anchor,
            meta,
            timestamp: self.timestamp,
        });
        true
    }

    fn finish(self) -> Vec<PlannedNotification> {
        self.out
    }
}

fn display_name(account: Option<&Account>) -> String {
    account
        .map(|a| format!("@{}", a.handle))
        .unwrap_or_else(|| "Someone".to_string())
}

fn excerpt(argument: &Argument) -> String {
    let text = if argument.summary.trim().is_empty() {
        argument.body.trim()
    } else {
        argument.summary.trim()
    };
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Plans recipients for semantic events
pub struct RecipientPlanner {
    directory: Arc<dyn Directory>,
    mentions: MentionResolver,
}

impl RecipientPlanner {
    pub fn new(directory: Arc<dyn Directory>, mentions: MentionResolver) -> Self {
        Self { directory, mentions }
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Plan one event
    pub async fn plan(&self, envelope: &EventEnvelope) -> Plan {
        let notifications = match &envelope.event {
            SemanticEvent::ArgumentCreated(argument) => self.plan_argument(envelope, argument).await,
            SemanticEvent::UpvoteCast(stake) => self.plan_upvote(envelope, stake).await,
            SemanticEvent::StakeRewardSettled(stake) => self.plan_stake_reward(envelope, stake).await,
            SemanticEvent::ArgumentSlashed(slash) => self.plan_slash(envelope, slash).await,
            SemanticEvent::AccountsUnjailed(addresses) => self.plan_unjailed(envelope, addresses).await,
            SemanticEvent::ReplyPosted(reply) => self.plan_reply(envelope, reply).await,
            SemanticEvent::RewardUnlocked(reward) => self.plan_reward(envelope, reward).await,
            SemanticEvent::BroadcastRequested(kind) => {
                return match self.plan_broadcast(envelope, *kind).await {
                    Some(plan) => Plan::Broadcast(plan),
                    None => Plan::Notifications(Vec::new()),
                };
            }
        };
        Plan::Notifications(notifications)
    }

    /// Resolve an address; misses and errors are logged and yield None
    async fn account(&self, address: &str) -> Option<Account> {
        match self.directory.account_by_address(address).await {
            Ok(Some(account)) => Some(account),
            Ok(None) => {
                debug!(address = %address, "No account for address, skipping recipient");
                None
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Account lookup failed, skipping recipient");
                None
            }
        }
    }

    async fn account_by_id(&self, id: i64) -> Option<Account> {
        match self.directory.account_by_id(id).await {
            Ok(Some(account)) => Some(account),
            Ok(None) => {
                debug!(account_id = id, "Unknown account id");
                None
            }
            Err(e) => {
                warn!(account_id = id, error = %e, "Account lookup failed");
                None
            }
        }
    }

    async fn argument(&self, id: i64) -> Option<Argument> {
        match self.directory.argument(id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(argument_id = id, error = %e, "Argument lookup failed");
                None
            }
        }
    }

    /// Claim id for an argument when the event did not carry one
    async fn claim_for_argument(&self, claim_id: Option<i64>, argument_id: i64) -> Option<i64> {
        match claim_id {
            Some(id) => Some(id),
            None => self.argument(argument_id).await.map(|a| a.claim_id),
        }
    }

    async fn plan_argument(&self, envelope: &EventEnvelope, argument: &Argument) -> Vec<PlannedNotification> {
        let author = self.account(&argument.creator).await;
        let mut plan = PlanBuilder::new(envelope, Some(&argument.creator), author.clone());
        let meta = Meta::argument(argument.claim_id, argument.id);

        let resolution = self.mentions.resolve(self.directory.as_ref(), &argument.body).await;
        let mention_meta = Meta {
            mention_type: Some(MentionKind::Argument),
            ..meta.clone()
        };
        for recipient in resolution.recipients {
            plan.emit(
                recipient,
                NotificationKind::Mention,
                resolution.body.as_str(),
                "Mentioned you in an argument",
                argument.id,
                mention_meta.clone(),
            );
        }

        let body = format!("{} added an argument: {}", display_name(author.as_ref()), excerpt(argument));

        let claim = match self.directory.claim(argument.claim_id).await {
            Ok(claim) => claim,
            Err(e) => {
                warn!(claim_id = argument.claim_id, error = %e, "Claim lookup failed");
                None
            }
        };
        let owner_address = claim.as_ref().map(|c| c.creator.clone());
        match &owner_address {
            Some(address) => {
                if let Some(owner) = self.account(address).await {
                    plan.emit(
                        owner,
                        NotificationKind::NewArgumentOnClaim,
                        body.as_str(),
                        "New argument on your claim",
                        argument.id,
                        meta.clone(),
                    );
                }
            }
            None => debug!(claim_id = argument.claim_id, "Claim not found, skipping owner"),
        }

        let participants = self
            .directory
            .claim_participants(argument.claim_id)
            .await
            .unwrap_or_else(|e| {
                warn!(claim_id = argument.claim_id, error = %e, "Participant lookup failed");
                Vec::new()
            });
        for address in participants {
            if owner_address.as_deref() == Some(address.as_str()) || address == argument.creator {
                continue;
            }
            if let Some(participant) = self.account(&address).await {
                plan.emit(
                    participant,
                    NotificationKind::NewArgumentOnClaim,
                    body.as_str(),
                    "New argument on a claim you joined",
                    argument.id,
                    meta.clone(),
                );
            }
        }

        plan.finish()
    }

    async fn plan_upvote(&self, envelope: &EventEnvelope, stake: &Stake) -> Vec<PlannedNotification> {
        let Some(argument) = self.argument(stake.argument_id).await else {
            debug!(argument_id = stake.argument_id, "Upvoted argument not found");
            return Vec::new();
        };

        let sender = self.account(&stake.creator).await;
        let mut plan = PlanBuilder::new(envelope, Some(&stake.creator), sender.clone());

        if let Some(author) = self.account(&argument.creator).await {
            plan.emit(
                author,
                NotificationKind::AgreeReceived,
                format!("{} agreed with your argument", display_name(sender.as_ref())),
                "Agreed",
                stake.argument_id,
                Meta::argument(argument.claim_id, argument.id),
            );
        }

        plan.finish()
    }

    async fn plan_stake_reward(&self, envelope: &EventEnvelope, stake: &ExpiredStake) -> Vec<PlannedNotification> {
        let Some(result) = &stake.result else {
            return Vec::new();
        };

        let meta = Meta {
            claim_id: self.claim_for_argument(stake.claim_id, stake.argument_id).await,
            argument_id: Some(stake.argument_id),
            ..Default::default()
        };
        let mut plan = PlanBuilder::new(envelope, None, None);

        let split = result.kind == RewardResultType::Upvote
            && !result.argument_creator.is_empty()
            && result.argument_creator != stake.creator;

        if split {
            if let Some(author) = self.account(&result.argument_creator).await {
                plan.emit(
                    author,
                    NotificationKind::StakeEarned,
                    format!(
                        "You earned {} TRU from agrees on your argument",
                        format_amount(result.argument_creator_reward.amount)
                    ),
                    "Earned TRU",
                    stake.argument_id,
                    meta.clone(),
                );
            }
            if let Some(staker) = self.account(&stake.creator).await {
                plan.emit(
                    staker,
                    NotificationKind::StakeEarned,
                    format!(
                        "You earned {} TRU for agreeing with an argument",
                        format_amount(result.stake_creator_reward.amount)
                    ),
                    "Earned TRU",
                    stake.argument_id,
                    meta,
                );
            }
        } else {
            let mut earned = result.stake_creator_reward.amount;
            if result.argument_creator == stake.creator {
                earned = earned.saturating_add(result.argument_creator_reward.amount);
            }
            if let Some(staker) = self.account(&stake.creator).await {
                plan.emit(
                    staker,
                    NotificationKind::StakeEarned,
                    format!("You earned {} TRU from your argument", format_amount(earned)),
                    "Earned TRU",
                    stake.argument_id,
                    meta,
                );
            }
        }

        plan.finish()
    }

    async fn plan_slash(&self, envelope: &EventEnvelope, slash: &SlashResult) -> Vec<PlannedNotification> {
        let meta = Meta {
            claim_id: self.claim_for_argument(slash.claim_id, slash.argument_id).await,
            argument_id: Some(slash.argument_id),
            ..Default::default()
        };
        let mut plan = PlanBuilder::new(envelope, None, None);

        let mut losses: HashMap<&str, u64> = HashMap::new();
        for punishment in &slash.punished {
            let entry = losses.entry(punishment.address.as_str()).or_default();
            *entry = entry.saturating_add(punishment.amount.amount);
        }

        // Jailed first so jailing wins over slashing for the same account
        for address in &slash.jailed {
            let Some(account) = self.account(address).await else {
                continue;
            };
            let body = match losses.get(address.as_str()) {
                Some(lost) => format!(
                    "Your account was jailed and you lost {} TRU after an argument you backed was slashed",
                    format_amount(*lost)
                ),
                None => "Your account was jailed after an argument you backed was slashed".to_string(),
            };
            plan.emit(account, NotificationKind::Jailed, body, "Jailed", slash.argument_id, meta.clone());
        }

        for punishment in &slash.punished {
            let Some(account) = self.account(&punishment.address).await else {
                continue;
            };
            let lost = losses.get(punishment.address.as_str()).copied().unwrap_or_default();
            plan.emit(
                account,
                NotificationKind::Slashed,
                format!(
                    "You lost {} TRU after an argument you backed was slashed",
                    format_amount(lost)
                ),
                "Slashed",
                slash.argument_id,
                meta.clone(),
            );
        }

        plan.finish()
    }

    async fn plan_unjailed(&self, envelope: &EventEnvelope, addresses: &[String]) -> Vec<PlannedNotification> {
        let mut plan = PlanBuilder::new(envelope, None, None);
        for address in addresses {
            if let Some(account) = self.account(address).await {
                let anchor = account.id;
                plan.emit(
                    account,
                    NotificationKind::Unjailed,
                    "Your account has been unjailed",
                    "Unjailed",
                    anchor,
                    Meta::default(),
                );
            }
        }
        plan.finish()
    }

    async fn plan_reply(&self, envelope: &EventEnvelope, reply: &ReplyPosted) -> Vec<PlannedNotification> {
        let body = match self.directory.comment(reply.id).await {
            Ok(Some(comment)) => comment.body,
            Ok(None) => {
                debug!(comment_id = reply.id, "Comment not found, planning without mentions");
                String::new()
            }
            Err(e) => {
                warn!(comment_id = reply.id, error = %e, "Comment lookup failed");
                String::new()
            }
        };

        let author = self.account(&reply.creator).await;
        let mut plan = PlanBuilder::new(envelope, Some(&reply.creator), author);
        if let Some(timestamp) = reply.timestamp {
            plan = plan.at(timestamp);
        }

        let scope = reply.scope();
        let meta = Meta {
            claim_id: Some(reply.claim_id),
            argument_id: reply.argument_id,
            comment_id: Some(reply.id),
            element_id: reply.element_id,
            mention_type: None,
        };

        let resolution = self.mentions.resolve(self.directory.as_ref(), &body).await;
        let mention_meta = Meta {
            mention_type: Some(MentionKind::Comment),
            ..meta.clone()
        };
        for recipient in resolution.recipients {
            plan.emit(
                recipient,
                NotificationKind::Mention,
                resolution.body.as_str(),
                "Mentioned you in a reply",
                reply.id,
                mention_meta.clone(),
            );
        }

        let participants = self.directory.reply_participants(&scope).await.unwrap_or_else(|e| {
            warn!(claim_id = reply.claim_id, error = %e, "Participant lookup failed");
            Vec::new()
        });
        for address in participants {
            if address == reply.creator {
                continue;
            }
            if let Some(participant) = self.account(&address).await {
                plan.emit(
                    participant,
                    NotificationKind::Reply,
                    resolution.body.as_str(),
                    "Replied in a discussion you joined",
                    reply.id,
                    meta.clone(),
                );
            }
        }

        // Argument creator for argument-level replies, claim creator otherwise
        let upstream = match reply.argument_id {
            Some(argument_id) => match &reply.argument_creator {
                Some(creator) => Some(creator.clone()),
                None => self.argument(argument_id).await.map(|a| a.creator),
            },
            None => match &reply.claim_creator {
                Some(creator) => Some(creator.clone()),
                None => match self.directory.claim(reply.claim_id).await {
                    Ok(claim) => claim.map(|c| c.creator),
                    Err(e) => {
                        warn!(claim_id = reply.claim_id, error = %e, "Claim lookup failed");
                        None
                    }
                },
            },
        };
        if let Some(address) = upstream {
            if let Some(owner) = self.account(&address).await {
                plan.emit(
                    owner,
                    NotificationKind::Reply,
                    resolution.body.as_str(),
                    "Replied to you",
                    reply.id,
                    meta,
                );
            }
        }

        plan.finish()
    }

    async fn plan_reward(&self, envelope: &EventEnvelope, reward: &RewardUnlocked) -> Vec<PlannedNotification> {
        let Some(rewardee) = self.account_by_id(reward.rewardee_id).await else {
            return Vec::new();
        };
        let causer = match reward.causer_id {
            Some(id) => self.account_by_id(id).await,
            None => None,
        };
        // Rewards earned through one's own action still notify
        let sender = causer.filter(|c| c.id != rewardee.id);

        let (what, action) = match reward.reward_type {
            RewardType::Invite => (
                format!("{} invite{}", reward.amount, if reward.amount == 1 { "" } else { "s" }),
                "Invite Unlocked",
            ),
            RewardType::Tru => (format!("{} TRU", format_amount(reward.amount)), "TRU Unlocked"),
        };
        let body = match (&reward.causer_action, &sender) {
            (Some(cause), Some(causer)) => {
                format!("You unlocked {} because @{} {}", what, causer.handle, cause)
            }
            (Some(cause), None) => format!("You unlocked {} for {}", what, cause),
            (None, _) => format!("You unlocked {}", what),
        };

        let mut plan = PlanBuilder::new(envelope, None, sender);
        plan.emit(
            rewardee,
            NotificationKind::RewardUnlocked,
            body,
            action,
            reward.causer_id.unwrap_or(reward.rewardee_id),
            Meta::default(),
        );
        plan.finish()
    }

    async fn plan_broadcast(&self, envelope: &EventEnvelope, kind: BroadcastKind) -> Option<BroadcastPlan> {
        match kind {
            BroadcastKind::FeaturedClaim => match self.directory.featured_claim().await {
                Ok(Some(claim)) => Some(BroadcastPlan {
                    source: envelope.id.clone(),
                    kind: NotificationKind::FeaturedBroadcast,
                    body: format!("Featured debate: {}", claim.body),
                    action: "Featured".to_string(),
                    anchor: claim.id,
                    meta: Meta::claim(claim.id),
                    timestamp: envelope.received_at,
                }),
                Ok(None) => {
                    warn!(event_id = %envelope.id, "No featured claim to broadcast");
                    None
                }
                Err(e) => {
                    warn!(event_id = %envelope.id, error = %e, "Featured claim lookup failed");
                    None
                }
            },
        }
    }
}
