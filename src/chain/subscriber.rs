//! Chain Subscriber - connects to the chain node for Push events
//!
//! Subscribes over the node's JSON-RPC WebSocket to every transaction or
//! end-of-block event matching `<namespace>.event = 'Push'` and forwards the
//! decoded [`ChainEvent`]s to the classifier. The subscription is
//! at-most-once: events emitted while disconnected are lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value as JsonValue};
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::types::{ChainEvent, Tag};
use crate::config::ChainArgs;
use crate::types::{HeraldError, Result};

const TX_EVENT: &str = "tendermint/event/Tx";
const NEW_BLOCK_EVENT: &str = "tendermint/event/NewBlock";

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Node WebSocket RPC URL
    pub rpc_url: String,
    /// Subscription query
    pub query: String,
    /// Whether tag keys and values arrive base64 encoded
    pub base64_attributes: bool,
    /// First reconnect delay
    pub reconnect_min: Duration,
    /// Reconnect delay ceiling
    pub reconnect_max: Duration,
    /// Ping interval for keepalive
    pub ping_interval: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            rpc_url: "ws://localhost:26657/websocket".to_string(),
            query: "trustory.event = 'Push'".to_string(),
            base64_attributes: true,
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
        }
    }
}

impl From<&ChainArgs> for SubscriberConfig {
    fn from(args: &ChainArgs) -> Self {
        Self {
            rpc_url: args.rpc_url.clone(),
            query: args.query(),
            base64_attributes: args.base64_attributes,
            reconnect_min: Duration::from_millis(args.reconnect_min_ms),
            reconnect_max: Duration::from_millis(args.reconnect_max_ms),
            ..Default::default()
        }
    }
}

/// Doubling reconnect delay bounded by `[min, max]`
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Delay to wait now; the next call waits twice as long
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Chain Subscriber - receives Push events from the chain node
pub struct ChainSubscriber {
    config: SubscriberConfig,
    connected: AtomicBool,
    /// Shutdown signal
    shutdown_tx: broadcast::Sender<()>,
}

impl ChainSubscriber {
    pub fn new(config: SubscriberConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            connected: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Whether a subscription is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Get a shutdown receiver
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the subscription until shutdown or until the classifier goes away
    pub async fn run(&self, events: mpsc::Sender<ChainEvent>) {
        let mut backoff = Backoff::new(self.config.reconnect_min, self.config.reconnect_max);
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Chain subscriber shutting down");
                break;
            }

            info!("Connecting to chain node at {}", self.config.rpc_url);

            match self
                .connect_and_listen(&events, &mut backoff, &mut shutdown_rx)
                .await
            {
                Ok(Listen::Stop) => break,
                Ok(Listen::Disconnected) => {}
                Err(e) => error!("Chain connection error: {}", e),
            }
            self.connected.store(false, Ordering::Relaxed);

            if events.is_closed() {
                break;
            }

            let delay = backoff.next_delay();
            info!("Reconnecting to chain node in {:?}", delay);

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown received during reconnect wait");
                    break;
                }
            }
        }

        self.connected.store(false, Ordering::Relaxed);
        info!("Chain subscriber stopped");
    }

    /// Connect, subscribe and forward events until the connection drops
    async fn connect_and_listen(
        &self,
        events: &mpsc::Sender<ChainEvent>,
        backoff: &mut Backoff,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<Listen> {
        let ws_stream = tokio::select! {
            connected = connect_async(self.config.rpc_url.as_str()) => connected?.0,
            _ = shutdown_rx.recv() => {
                info!("Shutdown received while connecting to chain node");
                return Ok(Listen::Stop);
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let subscribe = json!({
            "jsonrpc": "2.0",
            "method": "subscribe",
            "id": "0",
            "params": { "query": self.config.query },
        });
        write.send(Message::Text(subscribe.to_string())).await?;

        info!(query = %self.config.query, "Subscribed to chain events");
        self.connected.store(true, Ordering::Relaxed);

        // Backoff only resets once the node has actually answered
        let mut answered = false;
        let mut ping_interval = tokio::time::interval(self.config.ping_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, closing chain connection");
                    let _ = write.close().await;
                    return Ok(Listen::Stop);
                }

                _ = ping_interval.tick() => {
                    write.send(Message::Ping(vec![])).await?;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !answered {
                                answered = true;
                                backoff.reset();
                            }
                            for event in self.handle_message(&text) {
                                // Blocks while the classifier queue is full
                                if events.send(event).await.is_err() {
                                    warn!("Classifier queue closed, stopping chain subscriber");
                                    return Ok(Listen::Stop);
                                }
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("Received pong");
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Chain node closed connection");
                            return Ok(Listen::Disconnected);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(HeraldError::WebSocket("WebSocket stream ended".to_string()));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn handle_message(&self, text: &str) -> Vec<ChainEvent> {
        let value = match serde_json::from_str::<JsonValue>(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Dropping unparseable chain message: {}", e);
                return Vec::new();
            }
        };

        match parse_rpc_message(&value, self.config.base64_attributes) {
            Ok(events) => events,
            Err(e) => {
                warn!("Dropping chain message: {}", e);
                Vec::new()
            }
        }
    }
}

enum Listen {
    /// Shut down or downstream closed; do not reconnect
    Stop,
    /// Remote closed; reconnect
    Disconnected,
}

/// Decode one JSON-RPC frame into zero or more chain events
///
/// The subscribe acknowledgement (empty result) yields nothing.
pub fn parse_rpc_message(value: &JsonValue, base64_attributes: bool) -> Result<Vec<ChainEvent>> {
    if let Some(err) = value.get("error") {
        return Err(HeraldError::Upstream(format!("chain RPC error: {}", err)));
    }

    let data = match value.get("result").and_then(|r| r.get("data")) {
        Some(data) => data,
        None => return Ok(Vec::new()),
    };

    let event_type = data.get("type").and_then(JsonValue::as_str).unwrap_or_default();
    let inner = data.get("value").cloned().unwrap_or(JsonValue::Null);

    match event_type {
        TX_EVENT => {
            let tx = inner
                .get("TxResult")
                .ok_or_else(|| HeraldError::Decode("Tx event without TxResult".to_string()))?;
            let result = tx.get("result").cloned().unwrap_or(JsonValue::Null);

            let payload = match result.get("data").and_then(JsonValue::as_str) {
                Some(encoded) if !encoded.is_empty() => base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| HeraldError::Decode(format!("Tx data is not base64: {}", e)))?,
                _ => Vec::new(),
            };

            Ok(vec![ChainEvent::Tx {
                height: json_i64(tx.get("height")),
                index: json_i64(tx.get("index")) as u32,
                tags: collect_tags(&result, base64_attributes),
                payload,
            }])
        }
        NEW_BLOCK_EVENT => {
            let height = json_i64(
                inner
                    .get("block")
                    .and_then(|b| b.get("header"))
                    .and_then(|h| h.get("height")),
            );
            let tags = inner
                .get("result_end_block")
                .map(|end| collect_tags(end, base64_attributes))
                .unwrap_or_default();

            if tags.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![ChainEvent::BlockEnd { height, tags }])
        }
        other => {
            debug!("Ignoring chain event type {}", other);
            Ok(Vec::new())
        }
    }
}

/// Flatten `events[].attributes` and legacy `tags` into one list
fn collect_tags(result: &JsonValue, base64_attributes: bool) -> Vec<Tag> {
    let mut pairs: Vec<&JsonValue> = Vec::new();

    if let Some(tags) = result.get("tags").and_then(JsonValue::as_array) {
        pairs.extend(tags);
    }
    if let Some(events) = result.get("events").and_then(JsonValue::as_array) {
        for event in events {
            if let Some(attributes) = event.get("attributes").and_then(JsonValue::as_array) {
                pairs.extend(attributes);
            }
        }
    }

    pairs
        .into_iter()
        .filter_map(|pair| {
            let key = pair.get("key").and_then(JsonValue::as_str)?;
            let value = pair.get("value").and_then(JsonValue::as_str).unwrap_or_default();
            Some(Tag::new(
                decode_attribute(key, base64_attributes),
                decode_attribute(value, base64_attributes),
            ))
        })
        .collect()
}

/// Attribute text, base64-decoded when enabled and valid UTF-8
fn decode_attribute(raw: &str, base64_attributes: bool) -> String {
    if !base64_attributes {
        return raw.to_string();
    }
    base64::engine::general_purpose::STANDARD
        .decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

fn json_i64(value: Option<&JsonValue>) -> i64 {
    match value {
        Some(JsonValue::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(JsonValue::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn b64(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    fn test_config(rpc_url: String) -> SubscriberConfig {
        SubscriberConfig {
            rpc_url,
            reconnect_min: Duration::from_millis(100),
            reconnect_max: Duration::from_secs(10),
            ..Default::default()
        }
    }

    /// Local node that reads the subscribe frame, optionally acks it, then closes
    async fn one_shot_node(ack: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            let _subscribe = ws.next().await;
            if ack {
                let reply = json!({"jsonrpc": "2.0", "id": "0", "result": {}});
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
            let _ = ws.close(None).await;
        });
        format!("ws://{}/websocket", addr)
    }

    #[tokio::test]
    async fn test_shutdown_during_handshake_stops_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/websocket", listener.local_addr().unwrap());
        let subscriber = Arc::new(ChainSubscriber::new(test_config(url)));
        let (tx, _rx) = mpsc::channel(8);

        let runner = Arc::clone(&subscriber);
        let task = tokio::spawn(async move { runner.run(tx).await });

        // Hold the TCP connection without ever answering the upgrade
        let (_socket, _) = listener.accept().await.unwrap();
        subscriber.shutdown();

        let stopped = tokio::time::timeout(Duration::from_secs(3), task).await;
        assert!(stopped.is_ok(), "run kept going after shutdown");
        assert!(!subscriber.is_connected());
    }

    #[tokio::test]
    async fn test_silent_drop_keeps_backoff_growing() {
        let url = one_shot_node(false).await;
        let subscriber = ChainSubscriber::new(test_config(url));
        let (tx, _rx) = mpsc::channel(8);
        let mut shutdown_rx = subscriber.shutdown_receiver();

        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        backoff.next_delay();
        backoff.next_delay();

        let _ = subscriber
            .connect_and_listen(&tx, &mut backoff, &mut shutdown_rx)
            .await;
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_answered_subscription_resets_backoff() {
        let url = one_shot_node(true).await;
        let subscriber = ChainSubscriber::new(test_config(url));
        let (tx, _rx) = mpsc::channel(8);
        let mut shutdown_rx = subscriber.shutdown_receiver();

        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        backoff.next_delay();
        backoff.next_delay();

        let _ = subscriber
            .connect_and_listen(&tx, &mut backoff, &mut shutdown_rx)
            .await;
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_subscribe_ack_yields_nothing() {
        let ack = json!({"jsonrpc": "2.0", "id": "0", "result": {}});
        assert!(parse_rpc_message(&ack, true).unwrap().is_empty());
    }

    #[test]
    fn test_rpc_error_is_reported() {
        let err = json!({"jsonrpc": "2.0", "id": "0", "error": {"code": -32603, "message": "bad query"}});
        assert!(parse_rpc_message(&err, true).is_err());
    }

    #[test]
    fn test_parse_tx_with_base64_attributes() {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "result": {
                "query": "trustory.event = 'Push'",
                "data": {
                    "type": "tendermint/event/Tx",
                    "value": {
                        "TxResult": {
                            "height": "120",
                            "index": 3,
                            "result": {
                                "data": b64(r#"{"id":"7"}"#),
                                "events": [{
                                    "type": "trustory",
                                    "attributes": [
                                        {"key": b64("event"), "value": b64("Push")},
                                        {"key": b64("action"), "value": b64("create-argument")}
                                    ]
                                }]
                            }
                        }
                    }
                }
            }
        });

        let events = parse_rpc_message(&frame, true).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChainEvent::Tx {
                height,
                index,
                tags,
                payload,
            } => {
                assert_eq!(*height, 120);
                assert_eq!(*index, 3);
                assert_eq!(tags[1], Tag::new("action", "create-argument"));
                assert_eq!(payload.as_slice(), br#"{"id":"7"}"#);
            }
            other => panic!("expected Tx, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_new_block_with_legacy_tags() {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "result": {
                "data": {
                    "type": "tendermint/event/NewBlock",
                    "value": {
                        "block": {"header": {"height": "77"}},
                        "result_end_block": {
                            "tags": [{"key": "expired-stakes", "value": "[]"}]
                        }
                    }
                }
            }
        });

        let events = parse_rpc_message(&frame, false).unwrap();
        assert_eq!(
            events,
            vec![ChainEvent::BlockEnd {
                height: 77,
                tags: vec![Tag::new("expired-stakes", "[]")],
            }]
        );
    }
}
