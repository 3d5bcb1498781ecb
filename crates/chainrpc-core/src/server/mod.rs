//! Server side: request dispatch against the registered interface tree.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::{Dispatcher, DispatcherBuilder, ServerRequest, ServerResponse};
pub use handler::{ApplicationError, Call, ErrorClass, Handler};
