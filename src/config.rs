//! Configuration for Herald
//!
//! CLI arguments and environment variable handling using clap.

use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Herald - notification fan-out for the debate platform
#[derive(Parser, Debug, Clone)]
#[command(name = "herald")]
#[command(about = "Turns chain events and webhooks into inbox notifications and mobile pushes")]
pub struct Args {
    /// Unique identifier for this dispatcher instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on for webhooks and the read-state API
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:9001")]
    pub listen: SocketAddr,

    /// Chain subscription configuration
    #[command(flatten)]
    pub chain: ChainArgs,

    /// Path to the SQLite database shared with the platform
    #[arg(long, env = "DATABASE_PATH", default_value = "herald.db")]
    pub database_path: String,

    /// Push gateway base URL (requests are POSTed to <base>/push)
    #[arg(long, env = "PUSH_GATEWAY_URL", default_value = "http://localhost:9101")]
    pub push_gateway_url: String,

    /// Timeout for every outbound HTTP call, in milliseconds
    #[arg(long, env = "PUSH_TIMEOUT_MS", default_value = "10000")]
    pub push_timeout_ms: u64,

    /// Base URL for notification icons
    #[arg(long, env = "APP_ASSET_URL", default_value = "https://app.example.com/assets")]
    pub app_asset_url: String,

    /// Base URL for profile links written into mention bodies
    #[arg(long, env = "APP_PROFILE_URL", default_value = "https://app.example.com/profile")]
    pub app_profile_url: String,

    /// Bech32 prefix of on-chain addresses (used to detect address mentions)
    #[arg(long, env = "ADDRESS_PREFIX", default_value = "cosmos")]
    pub address_prefix: String,

    /// API key required on webhook and read-state routes (optional)
    #[arg(long, env = "WEBHOOK_API_KEY")]
    pub webhook_api_key: Option<String>,

    /// Capacity of each bounded pipeline queue
    #[arg(long, env = "QUEUE_CAPACITY", default_value = "1000")]
    pub queue_capacity: usize,

    /// Number of inbox writer workers
    #[arg(long, env = "INBOX_WORKERS", default_value = "4")]
    pub inbox_workers: usize,

    /// Number of push dispatcher workers
    #[arg(long, env = "PUSH_WORKERS", default_value = "4")]
    pub push_workers: usize,

    /// Accounts per broadcast chunk
    #[arg(long, env = "BROADCAST_CHUNK_SIZE", default_value = "500")]
    pub broadcast_chunk_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Chain node subscription configuration
#[derive(Parser, Debug, Clone)]
pub struct ChainArgs {
    /// Run the chain subscriber (disable to serve webhooks only)
    #[arg(long = "chain-enabled", env = "CHAIN_ENABLED", default_value = "true", action = ArgAction::Set)]
    pub enabled: bool,

    /// Chain node WebSocket RPC endpoint
    #[arg(long = "chain-rpc-url", env = "CHAIN_RPC_URL", default_value = "ws://localhost:26657/websocket")]
    pub rpc_url: String,

    /// Event namespace used in the subscription query
    #[arg(long = "chain-event-namespace", env = "CHAIN_EVENT_NAMESPACE", default_value = "trustory")]
    pub event_namespace: String,

    /// Whether event attribute keys and values are base64 encoded on the wire
    #[arg(
        long = "chain-base64-attributes",
        env = "CHAIN_BASE64_ATTRIBUTES",
        default_value = "true",
        action = ArgAction::Set
    )]
    pub base64_attributes: bool,

    /// Initial reconnect delay in milliseconds
    #[arg(long = "chain-reconnect-min-ms", env = "CHAIN_RECONNECT_MIN_MS", default_value = "1000")]
    pub reconnect_min_ms: u64,

    /// Maximum reconnect delay in milliseconds
    #[arg(long = "chain-reconnect-max-ms", env = "CHAIN_RECONNECT_MAX_MS", default_value = "60000")]
    pub reconnect_max_ms: u64,
}

impl ChainArgs {
    /// Subscription query, e.g. `trustory.event = 'Push'`
    pub fn query(&self) -> String {
        format!("{}.event = 'Push'", self.event_namespace)
    }
}

impl Args {
    /// Per-call timeout for outbound HTTP
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    /// Whether log output should be JSON
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("QUEUE_CAPACITY must be greater than zero".to_string());
        }

        if self.inbox_workers == 0 || self.push_workers == 0 {
            return Err("INBOX_WORKERS and PUSH_WORKERS must be greater than zero".to_string());
        }

        if self.broadcast_chunk_size == 0 {
            return Err("BROADCAST_CHUNK_SIZE must be greater than zero".to_string());
        }

        if self.chain.reconnect_min_ms > self.chain.reconnect_max_ms {
            return Err(
                "CHAIN_RECONNECT_MIN_MS must be less than or equal to CHAIN_RECONNECT_MAX_MS"
                    .to_string(),
            );
        }

        if !self.push_gateway_url.starts_with("http://")
            && !self.push_gateway_url.starts_with("https://")
        {
            return Err("PUSH_GATEWAY_URL must be an http(s) URL".to_string());
        }

        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err("LOG_FORMAT must be 'pretty' or 'json'".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["herald"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.listen.port(), 9001);
        assert_eq!(args.push_timeout(), Duration::from_secs(10));
        assert_eq!(args.chain.query(), "trustory.event = 'Push'");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let args = parse(&["--chain-reconnect-min-ms", "5000", "--chain-reconnect-max-ms", "100"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let args = parse(&["--push-workers", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_chain_can_be_disabled() {
        let args = parse(&["--chain-enabled", "false"]);
        assert!(!args.chain.enabled);
        assert!(args.chain.base64_attributes);
    }

    #[test]
    fn test_rejects_non_http_gateway() {
        let args = parse(&["--push-gateway-url", "ftp://gateway"]);
        assert!(args.validate().is_err());
    }
}
