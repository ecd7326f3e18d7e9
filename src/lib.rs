//! Herald - notification fan-out for the debate platform
//!
//! Herald listens to the chain for Push-tagged events and to the platform
//! backend for webhook events, decides who should hear about each one,
//! writes an inbox row per recipient and pushes it to their devices.

pub mod auth;
pub mod chain;
pub mod config;
pub mod db;
pub mod directory;
pub mod events;
pub mod inbox;
pub mod mention;
pub mod notification;
pub mod pipeline;
pub mod planner;
pub mod push;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{HeraldError, Result};
