//! Error types for the chainrpc runtime.
//!
//! A single taxonomy covers the three places a call can fail: building an
//! invocation chain on the client, encoding/decoding JSON against a type
//! descriptor, and exchanging the request with the peer (or, on the server,
//! dispatching it). Every variant maps onto an HTTP status so that server-side
//! failures can be written straight into an error envelope.

use crate::value::Value;
use thiserror::Error;

/// Main error type for chainrpc.
#[derive(Debug, Error)]
pub enum RpcError {
    // Registration errors
    #[error("Registration error: {message}")]
    Registration { message: String },

    #[error("Unknown type: {name}")]
    UnknownType { name: String },

    // Chain construction errors
    #[error("Unknown method {method:?} in interface {interface}")]
    UnknownMethod { interface: String, method: String },

    #[error("Method {method:?} expects {expected} argument(s), got {actual}")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("Argument {param:?} of method {method:?} expects {expected}, got {found}")]
    ArgumentType {
        method: String,
        param: String,
        expected: String,
        found: String,
    },

    #[error("Invocation chain is sealed by terminal method {method:?}")]
    ChainSealed { method: String },

    #[error("Invocation chain ends on interface {interface}, a terminal call is required")]
    IncompleteChain { interface: String },

    // Codec errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("JSON type error at {path}: expected {expected}, found {found}")]
    JsonType {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Unknown value {value:?} for enum {enum_name}")]
    UnknownEnumValue { enum_name: String, value: String },

    #[error("Unsupported map key type {key}, only string keys can be encoded")]
    UnsupportedKeyType { key: String },

    // Errors reported by the peer
    #[error("Client error {status}: {message}")]
    Client {
        status: u16,
        message: String,
        /// Application payload decoded against the interface exception type.
        data: Option<Value>,
    },

    #[error("Server error {status}: {message}")]
    ServerInternal { status: u16, message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Server dispatch errors
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Method not allowed: {message}")]
    MethodNotAllowed { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    // Transport and lifecycle
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation was cancelled")]
    Cancelled,
}

/// Result type alias for chainrpc operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    /// Create a registration error.
    pub fn registration(message: impl Into<String>) -> Self {
        RpcError::Registration {
            message: message.into(),
        }
    }

    /// Create a JSON error without an underlying parser error.
    pub fn json(message: impl Into<String>) -> Self {
        RpcError::Json {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error from any underlying failure.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RpcError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Convert to the HTTP status written into an error envelope.
    ///
    /// - 400: malformed arguments or payloads
    /// - 404: no method matches the request path
    /// - 405: the matched method requires another verb
    /// - 503: the peer is temporarily unavailable
    /// - 500: everything else
    ///
    /// Errors that came from the peer keep the status the peer reported.
    pub fn status_code(&self) -> u16 {
        match self {
            RpcError::Arity { .. }
            | RpcError::ArgumentType { .. }
            | RpcError::Json { .. }
            | RpcError::JsonType { .. }
            | RpcError::UnknownEnumValue { .. }
            | RpcError::UnsupportedKeyType { .. }
            | RpcError::BadRequest { .. } => 400,

            RpcError::UnknownMethod { .. } | RpcError::NotFound { .. } => 404,

            RpcError::MethodNotAllowed { .. } => 405,

            RpcError::Client { status, .. } | RpcError::ServerInternal { status, .. } => *status,

            RpcError::ServiceUnavailable { .. } => 503,

            // All other errors are internal errors
            _ => 500,
        }
    }

    /// Whether the failure is the caller's fault (a 4xx class error).
    pub fn is_client_fault(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } | RpcError::ServiceUnavailable { .. } => true,
            RpcError::ServerInternal { status, .. } => matches!(status, 502 | 504),
            _ => false,
        }
    }
}
