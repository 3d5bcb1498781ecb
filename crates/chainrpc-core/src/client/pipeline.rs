//! Request execution and response classification.

use super::middleware::{Middleware, Next};
use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::chain::SealedChain;
use crate::envelope::{truncate_text, Envelope, ErrorEnvelope};
use crate::error::{Result, RpcError};
use crate::value::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered middleware in front of one transport.
#[derive(Clone)]
pub struct Pipeline {
    middleware: Arc<[Arc<dyn Middleware>]>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn new(middleware: Vec<Arc<dyn Middleware>>, transport: Arc<dyn Transport>) -> Self {
        Self {
            middleware: middleware.into(),
            transport,
        }
    }

    /// Send a request through every middleware and the transport.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        Next::new(&self.middleware, self.transport.as_ref())
            .run(request)
            .await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// Turn a response into the terminal method's result or a typed error.
///
/// - non-2xx: an error classified by status, message taken from the error
///   envelope when there is one, else from the (truncated) body
/// - 2xx with an error envelope: classified by the envelope code
/// - 2xx otherwise: the `data` member decoded against the result type;
///   void results only look for an error envelope and ignore any other body
pub fn decode_response(chain: &SealedChain, response: &HttpResponse) -> Result<Value> {
    let method = chain.terminal().method();

    if !response.is_success() {
        let error = match Envelope::parse(&response.body) {
            Ok(Envelope::Error(envelope)) => peer_error(chain, response.status, envelope),
            _ => status_error(response.status, fallback_message(response), None),
        };
        warn!("{} failed: {}", method.name(), error);
        return Err(error);
    }

    if method.result().is_void() {
        if let Ok(Envelope::Error(envelope)) = Envelope::parse(&response.body) {
            let error = peer_error(chain, envelope.code, envelope);
            warn!("{} failed: {}", method.name(), error);
            return Err(error);
        }
        debug!("{} succeeded (void)", method.name());
        return Ok(Value::Null);
    }

    match Envelope::parse(&response.body)? {
        Envelope::Success(data) => {
            let value = chain.registry().codec().decode(&data, method.result())?;
            debug!("{} succeeded", method.name());
            Ok(value)
        }
        Envelope::Error(envelope) => {
            let error = peer_error(chain, envelope.code, envelope);
            warn!("{} failed: {}", method.name(), error);
            Err(error)
        }
    }
}

fn peer_error(chain: &SealedChain, status: u16, envelope: ErrorEnvelope) -> RpcError {
    let data = match (envelope.data, chain.exception_type()) {
        (Some(json), Some(ty)) => match chain.registry().codec().decode(&json, ty) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable error payload: {}", e);
                None
            }
        },
        _ => None,
    };
    status_error(status, envelope.message, data)
}

fn status_error(status: u16, message: String, data: Option<Value>) -> RpcError {
    match status {
        503 => RpcError::ServiceUnavailable { message },
        400..=499 => RpcError::Client {
            status,
            message,
            data,
        },
        _ => RpcError::ServerInternal { status, message },
    }
}

fn fallback_message(response: &HttpResponse) -> String {
    let text = truncate_text(response.body.trim());
    if text.is_empty() {
        format!("HTTP status {}", response.status)
    } else {
        text
    }
}
