//! Chain ingress
//!
//! ```text
//! ┌────────────┐   WebSocket    ┌──────────────────┐  ChainEvent  ┌────────────┐
//! │ Chain node │ ──────────────▶│ ChainSubscriber  │ ────────────▶│ classify() │ ──▶ planner
//! └────────────┘  JSON-RPC      └──────────────────┘  (bounded)   └────────────┘
//! ```

pub mod classifier;
pub mod subscriber;
pub mod types;

pub use classifier::classify;
pub use subscriber::{Backoff, ChainSubscriber, SubscriberConfig};
pub use types::{ChainEvent, Tag};
