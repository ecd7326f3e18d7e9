//! End-to-end planning scenarios against an in-memory inbox
//!
//! Each test plans one event with the real planner, persists the plan the
//! way an inbox worker does and then inspects the stored records.

use std::sync::Arc;

use herald::chain::types::{Coin, ExpiredStake, RewardResult, RewardResultType, Stake};
use herald::db::{Database, SqliteDirectory};
use herald::directory::{Argument, Directory};
use herald::events::{EventEnvelope, ReplyPosted, SemanticEvent};
use herald::inbox::InboxService;
use herald::mention::MentionResolver;
use herald::notification::{Meta, NotificationKind, NotificationRecord, PlannedNotification};
use herald::planner::RecipientPlanner;

const SEED: &str = "
INSERT INTO accounts (id, username, address) VALUES
    (1, 'alice', 'cosmos1alice'),
    (2, 'bob', 'cosmos1bob'),
    (3, 'carol', 'cosmos1carol'),
    (4, 'dave', 'cosmos1dave'),
    (5, 'eve', 'cosmos1eve'),
    (6, 'frank', 'cosmos1frank'),
    (7, 'gina', 'cosmos1gina'),
    (8, 'heidi', 'cosmos1heidi'),
    (9, 'ivan', 'cosmos1ivan');

INSERT INTO claims (id, creator, body) VALUES
    (42, 'cosmos1bob', 'Cities should ban cars downtown'),
    (50, 'cosmos1heidi', 'Remote work improves productivity');

INSERT INTO arguments (id, claim_id, creator, body) VALUES
    (7, 42, 'cosmos1carol', 'Air quality improves measurably'),
    (9, 42, 'cosmos1alice', 'Delivery logistics suffer'),
    (11, 42, 'cosmos1eve', 'Foot traffic helps local shops');

INSERT INTO comments (id, claim_id, creator, body) VALUES
    (1, 50, 'cosmos1gina', 'Depends on the team'),
    (2, 50, 'cosmos1ivan', 'Meetings got shorter for us'),
    (3, 50, 'cosmos1frank', '@gina which teams do you mean?');
";

struct Harness {
    planner: RecipientPlanner,
    inbox: InboxService,
}

impl Harness {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn(|conn| {
            conn.execute_batch(SEED)?;
            Ok(())
        })
        .unwrap();

        let directory: Arc<dyn Directory> = Arc::new(SqliteDirectory::new(Arc::clone(&db)));
        Self {
            planner: RecipientPlanner::new(
                directory,
                MentionResolver::new("https://app.example.com/profile", "cosmos"),
            ),
            inbox: InboxService::new(db),
        }
    }

    /// Plan and persist one event, returning the rows in emission order
    async fn deliver(&self, id: &str, event: SemanticEvent) -> Vec<NotificationRecord> {
        let plan = self.planner.plan(&EventEnvelope::new(id, event)).await;
        plan.notifications()
            .iter()
            .map(|planned| self.inbox.persist(planned).unwrap())
            .collect()
    }

    fn inbox_of(&self, account_id: i64) -> Vec<NotificationRecord> {
        self.inbox.list(account_id, Some(100), None).unwrap()
    }
}

fn summary(records: &[NotificationRecord]) -> Vec<(&str, NotificationKind)> {
    records
        .iter()
        .map(|r| (r.address.as_str(), r.kind))
        .collect()
}

#[tokio::test]
async fn test_argument_self_mention_is_dropped_and_mention_wins() {
    let harness = Harness::new();

    let records = harness
        .deliver(
            "tx-100-0-create-argument",
            SemanticEvent::ArgumentCreated(Argument {
                id: 12,
                claim_id: 42,
                creator: "cosmos1alice".to_string(),
                body: "thanks @alice and @bob for context".to_string(),
                summary: String::new(),
            }),
        )
        .await;

    let for_bob: Vec<_> = records.iter().filter(|r| r.address == "cosmos1bob").collect();
    assert_eq!(for_bob.len(), 1);
    assert_eq!(for_bob[0].kind, NotificationKind::Mention);
    assert!(records.iter().all(|r| r.address != "cosmos1alice"));
    assert!(harness.inbox_of(1).is_empty());
}

#[tokio::test]
async fn test_argument_without_mentions_notifies_owner_and_participants() {
    let harness = Harness::new();

    // Claim 42 already has carol, alice and eve arguing on it
    let records = harness
        .deliver(
            "tx-101-0-create-argument",
            SemanticEvent::ArgumentCreated(Argument {
                id: 13,
                claim_id: 42,
                creator: "cosmos1alice".to_string(),
                body: "Parking revenue funds transit".to_string(),
                summary: String::new(),
            }),
        )
        .await;

    assert_eq!(
        summary(&records),
        vec![
            ("cosmos1bob", NotificationKind::NewArgumentOnClaim),
            ("cosmos1carol", NotificationKind::NewArgumentOnClaim),
            ("cosmos1eve", NotificationKind::NewArgumentOnClaim),
        ]
    );
    assert!(records.iter().all(|r| r.anchor == 13));
    assert!(records.iter().all(|r| r.sender_id == Some(1)));
}

#[tokio::test]
async fn test_upvote_notifies_argument_author() {
    let harness = Harness::new();

    let records = harness
        .deliver(
            "tx-102-0-create-upvote",
            SemanticEvent::UpvoteCast(Stake {
                id: 77,
                argument_id: 11,
                creator: "cosmos1dave".to_string(),
                amount: Coin {
                    denom: "trusteak".to_string(),
                    amount: 1_000_000,
                },
            }),
        )
        .await;

    assert_eq!(summary(&records), vec![("cosmos1eve", NotificationKind::AgreeReceived)]);
    assert_eq!(records[0].anchor, 11);
    assert_eq!(records[0].meta, Meta::argument(42, 11));
}

#[tokio::test]
async fn test_upvote_settlement_splits_reward() {
    let harness = Harness::new();
    let coin = |amount| Coin {
        denom: "trusteak".to_string(),
        amount,
    };

    let records = harness
        .deliver(
            "block-200-stake-77",
            SemanticEvent::StakeRewardSettled(ExpiredStake {
                id: 77,
                argument_id: 11,
                claim_id: None,
                creator: "cosmos1dave".to_string(),
                amount: coin(1_000_000),
                result: Some(RewardResult {
                    kind: RewardResultType::Upvote,
                    argument_creator: "cosmos1eve".to_string(),
                    argument_creator_reward: coin(1_500_000),
                    stake_creator: "cosmos1dave".to_string(),
                    stake_creator_reward: coin(500_000),
                }),
            }),
        )
        .await;

    assert_eq!(
        summary(&records),
        vec![
            ("cosmos1eve", NotificationKind::StakeEarned),
            ("cosmos1dave", NotificationKind::StakeEarned),
        ]
    );
    assert!(records[0].body.contains("1.5"));
    assert!(records[1].body.contains("0.5"));
    assert_eq!(records[0].meta.claim_id, Some(42));
}

#[tokio::test]
async fn test_reply_mentions_come_before_participants_and_owner() {
    let harness = Harness::new();

    let records = harness
        .deliver(
            "webhook-reply-3",
            SemanticEvent::ReplyPosted(ReplyPosted {
                id: 3,
                claim_id: 50,
                argument_id: None,
                element_id: None,
                creator: "cosmos1frank".to_string(),
                claim_creator: None,
                argument_creator: None,
                timestamp: None,
            }),
        )
        .await;

    assert_eq!(
        summary(&records),
        vec![
            ("cosmos1gina", NotificationKind::Mention),
            ("cosmos1ivan", NotificationKind::Reply),
            ("cosmos1heidi", NotificationKind::Reply),
        ]
    );
    assert!(harness.inbox_of(6).is_empty());
    assert!(records[0].body.contains("[@gina](https://app.example.com/profile/cosmos1gina)"));
}

#[tokio::test]
async fn test_mark_thread_read_only_touches_that_thread() {
    let harness = Harness::new();
    let bob = herald::directory::Account {
        id: 2,
        handle: "bob".to_string(),
        address: "cosmos1bob".to_string(),
    };
    let reply = |claim_id: i64, comment_id: i64| PlannedNotification {
        source: format!("webhook-reply-{}", comment_id),
        recipient: bob.clone(),
        sender: None,
        kind: NotificationKind::Reply,
        body: "new reply".to_string(),
        action: "Replied to you".to_string(),
        anchor: comment_id,
        meta: Meta {
            comment_id: Some(comment_id),
            ..Meta::claim(claim_id)
        },
        timestamp: chrono::Utc::now(),
    };

    for comment_id in 1..=3 {
        harness.inbox.persist(&reply(42, comment_id)).unwrap();
    }
    let other = harness.inbox.persist(&reply(43, 4)).unwrap();

    let unread_before = harness.inbox.unread_count(2).unwrap();
    assert_eq!(harness.inbox.mark_thread_read(2, 42).unwrap(), 3);
    assert_eq!(harness.inbox.unread_count(2).unwrap(), unread_before - 3);

    for record in harness.inbox_of(2) {
        if record.id == other.id {
            assert!(!record.read);
            assert!(!record.seen);
        } else {
            assert!(record.read && record.seen);
        }
    }
}

#[tokio::test]
async fn test_mark_all_read_keeps_records_and_is_idempotent() {
    let harness = Harness::new();
    harness
        .deliver(
            "tx-103-0-create-argument",
            SemanticEvent::ArgumentCreated(Argument {
                id: 14,
                claim_id: 42,
                creator: "cosmos1dave".to_string(),
                body: "cc @bob".to_string(),
                summary: String::new(),
            }),
        )
        .await;

    let total = harness.inbox_of(2).len();
    assert!(total > 0);

    harness.inbox.mark_all_seen(2).unwrap();
    assert_eq!(harness.inbox.unseen_count(2).unwrap(), 0);
    assert!(harness.inbox.unread_count(2).unwrap() > 0);

    harness.inbox.mark_all_read(2).unwrap();
    assert_eq!(harness.inbox.mark_all_read(2).unwrap(), 0);
    assert_eq!(harness.inbox.unread_count(2).unwrap(), 0);
    assert_eq!(harness.inbox_of(2).len(), total);
}
