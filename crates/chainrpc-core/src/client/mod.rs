//! Client side: chain execution over a pluggable transport.
//!
//! ```ignore
//! let client = Client::builder(registry, "Directory", transport)
//!     .middleware(RequestIdMiddleware)
//!     .build()?;
//! let sealed = client.chain().call("users", vec![])?.call("user", vec![7i64.into()])?.call("get", vec![])?.seal()?;
//! let user = client.execute(&sealed).await?;
//! ```

pub mod encoder;
pub mod middleware;
pub mod pipeline;
pub mod retry;
pub mod transport;

pub use encoder::compile;
pub use middleware::{
    from_fn, HeaderMiddleware, LoggingMiddleware, Middleware, Next, RequestIdMiddleware,
};
pub use pipeline::{decode_response, Pipeline};
pub use retry::{RetryConfig, RetryMiddleware};
pub use transport::{HttpRequest, HttpResponse, Transport};

use crate::cancel::CancellationToken;
use crate::chain::{InvocationChain, SealedChain};
use crate::error::{Result, RpcError};
use crate::interface::InterfaceDescriptor;
use crate::registry::Registry;
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

/// Shared client handle. Cheap to clone; safe to use from many tasks.
#[derive(Debug, Clone)]
pub struct Client {
    registry: Arc<Registry>,
    root: Arc<InterfaceDescriptor>,
    pipeline: Pipeline,
}

impl Client {
    pub fn builder<T>(registry: Arc<Registry>, root: impl Into<String>, transport: T) -> ClientBuilder
    where
        T: Transport + 'static,
    {
        ClientBuilder {
            registry,
            root: root.into(),
            transport: Arc::new(transport),
            middleware: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn root(&self) -> &InterfaceDescriptor {
        &self.root
    }

    /// Start a chain at the root interface.
    pub fn chain(&self) -> InvocationChain {
        InvocationChain::with_root(self.registry.clone(), self.root.clone())
    }

    /// Execute a sealed chain: compile, send, classify and decode.
    ///
    /// Dropping the returned future aborts the exchange.
    pub async fn execute(&self, chain: &SealedChain) -> Result<Value> {
        let request = compile(chain)?;
        debug!("Executing {} {}", request.verb, request.path);
        let response = self.pipeline.send(request).await?;
        decode_response(chain, &response)
    }

    /// Like [`execute`](Self::execute), but abandons the exchange as soon as
    /// `token` is cancelled. Nothing runs after cancellation: no further
    /// middleware continuation and no decoding.
    pub async fn execute_with_cancel(
        &self,
        chain: &SealedChain,
        token: &CancellationToken,
    ) -> Result<Value> {
        token.check()?;
        let request = compile(chain)?;
        debug!("Executing {} {} (cancellable)", request.verb, request.path);

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Call to {} cancelled", chain.terminal().method().name());
                return Err(RpcError::Cancelled);
            }
            response = self.pipeline.send(request) => response?,
        };

        token.check()?;
        decode_response(chain, &response)
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    registry: Arc<Registry>,
    root: String,
    transport: Arc<dyn Transport>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ClientBuilder {
    /// Append a middleware; the first one added is the outermost.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Result<Client> {
        let root = self.registry.require_interface(&self.root)?.clone();
        debug!(
            "Client built for {} with {} middleware",
            root.name(),
            self.middleware.len()
        );
        Ok(Client {
            registry: self.registry,
            root,
            pipeline: Pipeline::new(self.middleware, self.transport),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::MethodDescriptor;
    use crate::types::TypeDescriptor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn registry() -> Arc<Registry> {
        Registry::builder()
            .interface(
                InterfaceDescriptor::new("Root")
                    .method(
                        MethodDescriptor::get("scope", TypeDescriptor::interface("Scope"))
                            .param("name", TypeDescriptor::String),
                    ),
            )
            .interface(
                InterfaceDescriptor::new("Scope")
                    .method(MethodDescriptor::get("size", TypeDescriptor::Int64)),
            )
            .build()
            .unwrap()
    }

    /// Answers with the request path length after an optional delay.
    struct SlowTransport {
        delay: Duration,
        completed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            tokio::time::sleep(self.delay).await;
            self.completed.store(true, Ordering::SeqCst);
            Ok(HttpResponse::new(200, format!(r#"{{"data":{}}}"#, request.path.len())))
        }
    }

    fn client(delay: Duration) -> (Client, Arc<AtomicBool>) {
        let completed = Arc::new(AtomicBool::new(false));
        let transport = SlowTransport {
            delay,
            completed: completed.clone(),
        };
        let client = Client::builder(registry(), "Root", transport)
            .middleware(LoggingMiddleware)
            .build()
            .unwrap();
        (client, completed)
    }

    fn sealed(client: &Client) -> SealedChain {
        client
            .chain()
            .call("scope", vec!["ab".into()])
            .unwrap()
            .call("size", vec![])
            .unwrap()
            .seal()
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute() {
        let (client, _) = client(Duration::ZERO);
        let value = client.execute(&sealed(&client)).await.unwrap();
        // "/scope/ab/size"
        assert_eq!(value, Value::Int64(14));
    }

    #[tokio::test]
    async fn test_unknown_root_rejected() {
        let transport = SlowTransport {
            delay: Duration::ZERO,
            completed: Arc::new(AtomicBool::new(false)),
        };
        let result = Client::builder(registry(), "Missing", transport).build();
        assert!(matches!(result, Err(RpcError::UnknownType { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_in_flight_exchange() {
        let (client, completed) = client(Duration::from_secs(30));
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = client.execute_with_cancel(&sealed(&client), &token).await;
        assert!(matches!(result, Err(RpcError::Cancelled)));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_sends_nothing() {
        let (client, completed) = client(Duration::ZERO);
        let token = CancellationToken::new();
        token.cancel();
        let result = client.execute_with_cancel(&sealed(&client), &token).await;
        assert!(matches!(result, Err(RpcError::Cancelled)));
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_client() {
        let (client, _) = client(Duration::from_millis(5));
        let chain = sealed(&client);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                let chain = chain.clone();
                tokio::spawn(async move { client.execute(&chain).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), Value::Int64(14));
        }
    }
}
