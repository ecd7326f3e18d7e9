//! Notification pipeline
//!
//! ```text
//!  chain ──▶ classifier ─┐
//!                        ├─▶ [events] ─▶ planner ─▶ [planned] ─▶ inbox workers ─▶ [records] ─▶ push workers
//!  webhooks ─────────────┘
//! ```
//!
//! Every arrow between stages is a bounded mpsc queue, so a slow stage
//! backpressures the ones before it. The planner is a single task to keep
//! per-event dedup and arrival order; inbox and push stages are worker
//! pools sharing one receiver. One event's notifications travel as a single
//! batch, which keeps their emission order through both pools.
//!
//! Shutdown closes the ingress queue; each stage exits once its input is
//! drained and closed, which closes the next stage's input in turn.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::chain::{classify, ChainEvent};
use crate::config::Args;
use crate::events::EventEnvelope;
use crate::inbox::InboxService;
use crate::notification::NotificationRecord;
use crate::planner::{expand_broadcast, Plan, PlanBatch, RecipientPlanner};
use crate::push::PushDispatcher;
use crate::types::{HeraldError, Result};

/// Persisted rows of one event, handed to the push stage
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub source: String,
    pub records: Vec<NotificationRecord>,
}

/// Pipeline sizing
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub inbox_workers: usize,
    pub push_workers: usize,
    pub broadcast_chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            inbox_workers: 4,
            push_workers: 4,
            broadcast_chunk_size: 500,
        }
    }
}

impl From<&Args> for PipelineConfig {
    fn from(args: &Args) -> Self {
        Self {
            queue_capacity: args.queue_capacity,
            inbox_workers: args.inbox_workers,
            push_workers: args.push_workers,
            broadcast_chunk_size: args.broadcast_chunk_size,
        }
    }
}

/// Closable handle to the semantic event queue
///
/// Webhooks enqueue through this handle. Once closed, further enqueues fail
/// with [`HeraldError::QueueClosed`] while already queued events drain.
#[derive(Clone)]
pub struct EventQueue {
    tx: Arc<Mutex<Option<mpsc::Sender<EventEnvelope>>>>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            capacity,
        };
        (queue, rx)
    }

    fn sender(&self) -> Option<mpsc::Sender<EventEnvelope>> {
        self.tx.lock().ok().and_then(|tx| tx.clone())
    }

    /// Enqueue one event, waiting while the queue is full
    pub async fn enqueue(&self, envelope: EventEnvelope) -> Result<()> {
        let tx = self
            .sender()
            .ok_or_else(|| HeraldError::QueueClosed("event queue is shut down".to_string()))?;
        tx.send(envelope)
            .await
            .map_err(|_| HeraldError::QueueClosed("event queue is shut down".to_string()))
    }

    /// Refuse further enqueues
    pub fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender().is_none()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots; zero once closed
    pub fn available(&self) -> usize {
        self.sender().map(|tx| tx.capacity()).unwrap_or(0)
    }
}

/// The running stages
pub struct Pipeline {
    events: EventQueue,
    chain_tx: Option<mpsc::Sender<ChainEvent>>,
    stages: Vec<(&'static str, JoinHandle<()>)>,
}

impl Pipeline {
    /// Spawn every stage
    pub fn spawn(
        config: PipelineConfig,
        planner: Arc<RecipientPlanner>,
        inbox: Arc<InboxService>,
        push: Arc<PushDispatcher>,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (chain_tx, chain_rx) = mpsc::channel::<ChainEvent>(capacity);
        let (events, events_rx) = EventQueue::new(capacity);
        let (planned_tx, planned_rx) = mpsc::channel::<PlanBatch>(capacity);
        let (records_tx, records_rx) = mpsc::channel::<RecordBatch>(capacity);

        let mut stages = Vec::new();

        // The classifier holds its own sender so closing webhook ingress
        // does not cut off chain events that are still queued
        if let Some(classified_tx) = events.sender() {
            stages.push(("classifier", tokio::spawn(classifier_stage(chain_rx, classified_tx))));
        }

        stages.push((
            "planner",
            tokio::spawn(planner_stage(
                events_rx,
                planner,
                planned_tx,
                config.broadcast_chunk_size,
            )),
        ));

        let planned_rx = Arc::new(tokio::sync::Mutex::new(planned_rx));
        for i in 0..config.inbox_workers.max(1) {
            stages.push((
                "inbox",
                tokio::spawn(inbox_worker(
                    i,
                    Arc::clone(&planned_rx),
                    Arc::clone(&inbox),
                    records_tx.clone(),
                )),
            ));
        }
        drop(records_tx);

        let records_rx = Arc::new(tokio::sync::Mutex::new(records_rx));
        for i in 0..config.push_workers.max(1) {
            stages.push((
                "push",
                tokio::spawn(push_worker(i, Arc::clone(&records_rx), Arc::clone(&push))),
            ));
        }

        info!(
            queue_capacity = capacity,
            inbox_workers = config.inbox_workers,
            push_workers = config.push_workers,
            "Notification pipeline started"
        );

        Self {
            events,
            chain_tx: Some(chain_tx),
            stages,
        }
    }

    /// Handle webhooks enqueue through
    pub fn events(&self) -> EventQueue {
        self.events.clone()
    }

    /// Sender for the chain subscriber; can be taken once
    pub fn take_chain_sender(&mut self) -> Option<mpsc::Sender<ChainEvent>> {
        self.chain_tx.take()
    }

    /// Close ingress and wait for every stage to drain
    ///
    /// The chain subscriber must already have stopped, or its sender
    /// dropped, for the classifier to finish.
    pub async fn shutdown(mut self) {
        info!("Draining notification pipeline");
        self.events.close();
        self.chain_tx.take();

        for (name, handle) in self.stages {
            if let Err(e) = handle.await {
                error!(stage = name, error = %e, "Pipeline stage panicked");
            }
        }
        info!("Notification pipeline drained");
    }
}

async fn classifier_stage(mut rx: mpsc::Receiver<ChainEvent>, tx: mpsc::Sender<EventEnvelope>) {
    while let Some(event) = rx.recv().await {
        for envelope in classify(&event) {
            debug!(event_id = %envelope.id, kind = envelope.event.name(), "Classified chain event");
            if tx.send(envelope).await.is_err() {
                error!("Event queue closed, stopping classifier");
                return;
            }
        }
    }
    info!("Classifier stopped");
}

async fn planner_stage(
    mut rx: mpsc::Receiver<EventEnvelope>,
    planner: Arc<RecipientPlanner>,
    planned_tx: mpsc::Sender<PlanBatch>,
    chunk_size: usize,
) {
    let mut broadcasts = JoinSet::new();

    while let Some(envelope) = rx.recv().await {
        let finished = reap_finished(&mut broadcasts);
        if finished > 0 {
            debug!(finished, "Broadcast fan-outs completed");
        }

        match planner.plan(&envelope).await {
            Plan::Notifications(notifications) => {
                if notifications.is_empty() {
                    debug!(event_id = %envelope.id, kind = envelope.event.name(), "Event planned no notifications");
                    continue;
                }
                info!(
                    event_id = %envelope.id,
                    kind = envelope.event.name(),
                    count = notifications.len(),
                    "Event planned"
                );
                let batch = PlanBatch {
                    source: envelope.id,
                    notifications,
                };
                if planned_tx.send(batch).await.is_err() {
                    error!("Inbox queue closed, stopping planner");
                    break;
                }
            }
            Plan::Broadcast(plan) => {
                info!(event_id = %plan.source, "Starting broadcast fan-out");
                let directory = Arc::clone(planner.directory());
                let tx = planned_tx.clone();
                broadcasts.spawn(async move {
                    if let Err(e) = expand_broadcast(directory.as_ref(), &plan, chunk_size, &tx).await {
                        error!(event_id = %plan.source, error = %e, "Broadcast fan-out aborted");
                    }
                });
            }
        }
    }

    // In-flight broadcasts hold senders; let them finish so the drain covers them
    while broadcasts.join_next().await.is_some() {}
    info!("Planner stopped");
}

/// Drop completed broadcast tasks without waiting on the rest
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while tasks.try_join_next().is_some() {
        reaped += 1;
    }
    reaped
}

async fn inbox_worker(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PlanBatch>>>,
    inbox: Arc<InboxService>,
    records_tx: mpsc::Sender<RecordBatch>,
) {
    loop {
        let batch = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(batch) => batch,
                None => break,
            }
        };

        let mut records = Vec::with_capacity(batch.notifications.len());
        for planned in &batch.notifications {
            match inbox.persist(planned) {
                Ok(record) => records.push(record),
                Err(e) => error!(
                    event_id = %batch.source,
                    recipient = planned.recipient.id,
                    error = %e,
                    "Failed to persist notification"
                ),
            }
        }
        debug!(worker_id, event_id = %batch.source, persisted = records.len(), "Batch persisted");

        if records.is_empty() {
            continue;
        }
        let batch = RecordBatch {
            source: batch.source,
            records,
        };
        if records_tx.send(batch).await.is_err() {
            error!("Push queue closed, stopping inbox worker {}", worker_id);
            break;
        }
    }
    info!("Inbox worker {} stopped", worker_id);
}

async fn push_worker(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<RecordBatch>>>,
    push: Arc<PushDispatcher>,
) {
    loop {
        let batch = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(batch) => batch,
                None => break,
            }
        };

        for record in &batch.records {
            push.dispatch(record).await;
        }
        debug!(worker_id, event_id = %batch.source, "Batch pushed");
    }
    info!("Push worker {} stopped", worker_id);
}
