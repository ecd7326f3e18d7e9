//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::auth::{ApiKeyValidator, API_KEY_HEADER};
use crate::chain::ChainSubscriber;
use crate::config::Args;
use crate::inbox::InboxService;
use crate::pipeline::EventQueue;
use crate::routes;
use crate::types::HeraldError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const COMMENT_WEBHOOK: &str = "/sendCommentNotification";
const REWARD_WEBHOOK: &str = "/sendRewardNotification";
const BROADCAST_WEBHOOK: &str = "/sendBroadcastNotification";

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub inbox: Arc<InboxService>,
    /// Semantic event queue webhooks enqueue onto
    pub events: EventQueue,
    /// Chain subscriber, when enabled
    pub chain: Option<Arc<ChainSubscriber>>,
    pub api_keys: ApiKeyValidator,
}

impl AppState {
    pub fn new(
        args: Args,
        inbox: Arc<InboxService>,
        events: EventQueue,
        chain: Option<Arc<ChainSubscriber>>,
    ) -> Self {
        let api_keys = ApiKeyValidator::new(args.webhook_api_key.clone());
        Self {
            args,
            inbox,
            events,
            chain,
            api_keys,
        }
    }
}

/// Bind the listener and serve until shutdown
pub async fn run(state: Arc<AppState>, shutdown: broadcast::Receiver<()>) -> Result<(), HeraldError> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(|e| HeraldError::Config(format!("Failed to bind {}: {}", state.args.listen, e)))?;

    info!(
        "Herald listening on {} as node {}",
        state.args.listen, state.args.node_id
    );
    if !state.api_keys.is_configured() {
        warn!("WEBHOOK_API_KEY not set - webhook and inbox routes are unauthenticated");
    }

    serve(listener, state, shutdown).await;
    Ok(())
}

/// Accept connections on an already bound listener until shutdown
pub async fn serve(listener: TcpListener, state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("HTTP server no longer accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    debug!("[{}] {} {}", addr, method, path);

    if path != "/health" {
        let api_key = req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if !state.api_keys.validate(api_key) {
            warn!("[{}] Rejected {} {}: invalid API key", addr, method, path);
            return Ok(to_boxed(routes::error_response(HeraldError::Unauthorized(
                "missing or invalid API key".to_string(),
            ))));
        }
    }

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => routes::health_check(&state),

        (&Method::POST, COMMENT_WEBHOOK) => match read_body(req).await {
            Ok(body) => routes::handle_comment_notification(&state, body).await,
            Err(response) => response,
        },
        (&Method::POST, REWARD_WEBHOOK) => match read_body(req).await {
            Ok(body) => routes::handle_reward_notification(&state, body).await,
            Err(response) => response,
        },
        (&Method::POST, BROADCAST_WEBHOOK) => match read_body(req).await {
            Ok(body) => routes::handle_broadcast_notification(&state, body).await,
            Err(response) => response,
        },
        (_, COMMENT_WEBHOOK | REWARD_WEBHOOK | BROADCAST_WEBHOOK) => routes::error_response(
            HeraldError::MethodNotAllowed(format!("{} {}", method, path)),
        ),

        (&Method::POST, "/devices") => match read_body(req).await {
            Ok(body) => routes::handle_register_device(&state, body).await,
            Err(response) => response,
        },
        (&Method::DELETE, "/devices") => match read_body(req).await {
            Ok(body) => routes::handle_unregister_device(&state, body).await,
            Err(response) => response,
        },

        (_, p) if p.starts_with("/notifications/") => {
            routes::handle_notifications_request(&state, &method, p, query.as_deref()).await
        }

        _ => routes::not_found_response(&path),
    };

    Ok(to_boxed(response))
}

/// Collect the request body; an unreadable body is a 500
async fn read_body(req: Request<Incoming>) -> Result<Bytes, Response<Full<Bytes>>> {
    match req.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            warn!("Request body error: {}", e);
            Err(routes::json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({ "error": "Failed to read request body" }),
            ))
        }
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
