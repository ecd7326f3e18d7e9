//! Error types for Herald

use hyper::StatusCode;

/// Main error type for Herald operations
#[derive(Debug, thiserror::Error)]
pub enum HeraldError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Queue closed: {0}")]
    QueueClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HeraldError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::WebSocket(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::QueueClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() }).to_string();
        (status, body)
    }
}

impl From<std::io::Error> for HeraldError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for HeraldError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(format!("JSON error: {}", err))
    }
}

impl From<rusqlite::Error> for HeraldError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<hyper::Error> for HeraldError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HeraldError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<reqwest::Error> for HeraldError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Upstream(format!("request timed out: {}", err))
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

/// Result type alias for Herald operations
pub type Result<T> = std::result::Result<T, HeraldError>;
