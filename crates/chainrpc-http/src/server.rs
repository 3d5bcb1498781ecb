//! HTTP server implementation using Axum.

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chainrpc::codec::decode_path_segment;
use chainrpc::config::{ServerConfig, WireConfig};
use chainrpc::{Dispatcher, ErrorEnvelope, RpcError, ServerRequest};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Build the router: a health check, and every other route handed to the dispatcher.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    // Configure CORS for browser clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(ServerConfig::HEALTH_PATH, get(handle_health))
        .fallback(handle_rpc)
        .layer(DefaultBodyLimit::max(ServerConfig::MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(dispatcher)
}

/// Start the HTTP server in the background.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(dispatcher: Dispatcher, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(dispatcher));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Convert the HTTP request into a [`ServerRequest`] and answer with the dispatcher's response.
///
/// The query string and body are decoded here rather than by axum extractors
/// so that malformed input is answered with an error envelope too.
async fn handle_rpc(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let request = match server_request(&method, &uri, body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected {} {}: {}", method, uri.path(), e);
            let envelope = ErrorEnvelope::new(e.status_code(), e.to_string());
            return respond(envelope.code, WireConfig::JSON_CONTENT_TYPE, envelope.to_json_string());
        }
    };

    let response = dispatcher.dispatch(request).await;
    respond(response.status, response.content_type, response.body)
}

fn server_request(method: &Method, uri: &Uri, body: Bytes) -> Result<ServerRequest, RpcError> {
    let body = String::from_utf8(body.to_vec()).map_err(|e| RpcError::BadRequest {
        message: format!("request body is not UTF-8: {}", e),
    })?;
    Ok(ServerRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: parse_query(uri.query().unwrap_or_default())?,
        body,
    })
}

/// Decode `a=1&b=2`; a repeated name keeps its last value.
fn parse_query(query: &str) -> Result<HashMap<String, String>, RpcError> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let decode = |text: &str| {
            decode_path_segment(&text.replace('+', " "))
                .map(|decoded| decoded.into_owned())
                .map_err(|_| RpcError::BadRequest {
                    message: format!("malformed query parameter {:?}", pair),
                })
        };
        params.insert(decode(name)?, decode(value)?);
    }
    Ok(params)
}

fn respond(status: u16, content_type: &'static str, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|e| {
            error!("Failed to build response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
