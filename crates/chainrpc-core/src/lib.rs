//! chainrpc - Descriptor-driven RPC runtime.
//!
//! Service interfaces are declared once as descriptors. On the client, a
//! sequence of calls navigating nested interfaces is recorded as an
//! [`InvocationChain`], compiled into one HTTP request and executed through a
//! middleware pipeline. On the server, the [`Dispatcher`] routes the same
//! request shape back to a bound handler. All values travel as JSON, encoded
//! against their [`TypeDescriptor`].
//!
//! The crate has no network dependency of its own: requests go out through a
//! [`Transport`] and come in as [`ServerRequest`]s. See the `chainrpc-http`
//! crate for an axum host and a reqwest transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use chainrpc::{Client, InterfaceDescriptor, MethodDescriptor, Registry, TypeDescriptor};
//!
//! let registry = Registry::builder()
//!     .interface(
//!         InterfaceDescriptor::new("Calculator").method(
//!             MethodDescriptor::get("add", TypeDescriptor::Int64)
//!                 .param("a", TypeDescriptor::Int64)
//!                 .param("b", TypeDescriptor::Int64),
//!         ),
//!     )
//!     .build()?;
//!
//! let client = Client::builder(registry, "Calculator", transport).build()?;
//! let sealed = client.chain().call("add", vec![1i64.into(), 2i64.into()])?.seal()?;
//! let sum = client.execute(&sealed).await?;
//! ```

pub mod cancel;
pub mod chain;
pub mod client;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod interface;
pub mod registry;
pub mod server;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use chain::{Invocation, InvocationChain, SealedChain};
pub use client::{
    Client, ClientBuilder, HeaderMiddleware, HttpRequest, HttpResponse, LoggingMiddleware,
    Middleware, Next, RequestIdMiddleware, RetryConfig, RetryMiddleware, Transport,
};
pub use codec::JsonCodec;
pub use envelope::{Envelope, ErrorEnvelope};
pub use error::{Result, RpcError};
pub use interface::{ArgPlacement, HttpVerb, InterfaceDescriptor, MethodDescriptor, ParamDescriptor};
pub use registry::{Registry, RegistryBuilder};
pub use server::{
    ApplicationError, Call, Dispatcher, DispatcherBuilder, ErrorClass, Handler, ServerRequest,
    ServerResponse,
};
pub use types::{EnumDescriptor, FieldDescriptor, StructDescriptor, TypeDescriptor, TypeKind};
pub use value::{StructValue, Value};
