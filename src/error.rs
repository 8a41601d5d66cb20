use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use tonic::Code;

#[derive(Debug)]
pub enum GatewayError {
    /// The upstream channel could not be established or was lost. Fatal for
    /// the enclosing operation; never retried automatically.
    Connection(String),
    Auth(String),
    NotFound(String),
    Validation(String),
    /// A live subscription terminated unexpectedly.
    Stream(String),
    /// Any other upstream failure, kept verbatim for the logs.
    Rpc(tonic::Status),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Connection(_) => "upstream_unavailable",
            GatewayError::Auth(_) => "unauthorized",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Validation(_) => "invalid_request",
            GatewayError::Stream(_) => "stream_closed",
            GatewayError::Rpc(_) => "upstream_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Connection(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Stream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Rpc(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn message(&self) -> String {
        match self {
            GatewayError::Connection(e) => {
                tracing::error!("upstream connection error: {e}");
                "chat service unavailable".to_string()
            }
            GatewayError::Auth(msg) => msg.clone(),
            GatewayError::NotFound(msg) => msg.clone(),
            GatewayError::Validation(msg) => msg.clone(),
            GatewayError::Stream(msg) => msg.clone(),
            GatewayError::Rpc(status) => {
                tracing::error!("upstream rpc error: {status}");
                "upstream request failed".to_string()
            }
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Connection(e) => write!(f, "connection error: {e}"),
            GatewayError::Auth(msg) => write!(f, "auth error: {msg}"),
            GatewayError::NotFound(msg) => write!(f, "not found: {msg}"),
            GatewayError::Validation(msg) => write!(f, "invalid request: {msg}"),
            GatewayError::Stream(msg) => write!(f, "stream error: {msg}"),
            GatewayError::Rpc(status) => write!(f, "rpc error: {status}"),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.message()
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<tonic::Status> for GatewayError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            Code::Unauthenticated | Code::PermissionDenied => {
                GatewayError::Auth(status.message().to_string())
            }
            Code::NotFound => GatewayError::NotFound(status.message().to_string()),
            Code::Unavailable => GatewayError::Connection(status.message().to_string()),
            Code::InvalidArgument => GatewayError::Validation(status.message().to_string()),
            _ => GatewayError::Rpc(status),
        }
    }
}

impl From<tonic::transport::Error> for GatewayError {
    fn from(e: tonic::transport::Error) -> Self {
        GatewayError::Connection(e.to_string())
    }
}
