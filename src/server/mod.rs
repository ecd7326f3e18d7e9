//! HTTP server for webhooks, device registration and the read-state API

pub mod http;

pub use http::{run, serve, AppState};
