//! chainrpc-http - HTTP hosting and transport for chainrpc.
//!
//! - [`server`]: axum router feeding every request into a [`chainrpc::Dispatcher`]
//! - [`transport`]: reqwest-backed [`chainrpc::Transport`]
//! - [`demo`]: an in-memory user directory service used by the binary and tests

pub mod demo;
pub mod server;
pub mod transport;

pub use server::{router, start_server};
pub use transport::ReqwestTransport;
