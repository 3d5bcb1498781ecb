//! `Transport` backed by reqwest.

use async_trait::async_trait;
use chainrpc::config::ClientConfig;
use chainrpc::{HttpRequest, HttpResponse, HttpVerb, RpcError, Transport};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Sends compiled requests to a base URL over HTTP.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Create a transport with the default timeout.
    pub fn new(base_url: &str) -> chainrpc::Result<Self> {
        Self::with_timeout(base_url, ClientConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> chainrpc::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RpcError::transport(format!("invalid base URL {:?}", base_url), e))?;
        let client = reqwest::Client::builder()
            .user_agent(ClientConfig::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::transport("failed to build HTTP client", e))?;
        Ok(Self { client, base_url })
    }

    /// Use an existing reqwest client, e.g. one with custom TLS settings.
    pub fn from_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, request: &HttpRequest) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            request.path_and_query()
        )
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> chainrpc::Result<HttpResponse> {
        let url = self.url_for(&request);
        debug!("HTTP {} {}", request.verb, url);

        let mut builder = match request.verb {
            HttpVerb::Get => self.client.get(&url),
            HttpVerb::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RpcError::transport(format!("request to {} failed", url), e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| RpcError::transport(format!("failed to read response from {}", url), e))?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_path_and_query() {
        let transport = ReqwestTransport::new("http://127.0.0.1:8080/api/").unwrap();
        let request = HttpRequest {
            path: "/search/ACTIVE".into(),
            query: vec![("limit".into(), "5".into())],
            ..Default::default()
        };
        assert_eq!(
            transport.url_for(&request),
            "http://127.0.0.1:8080/api/search/ACTIVE?limit=5"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ReqwestTransport::new("not a url"),
            Err(RpcError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        // Port 9 (discard) is almost never listening on loopback.
        let transport =
            ReqwestTransport::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = transport.send(HttpRequest::default()).await;
        assert!(matches!(result, Err(RpcError::Transport { .. })));
        assert!(result.unwrap_err().is_retryable());
    }
}
