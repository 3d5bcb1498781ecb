//! Handler seam: what business code implements for each terminal method.

use crate::chain::Invocation;
use crate::value::Value;
use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;

/// Whether an application error is the caller's fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ClientFault,
    Internal,
}

/// Error raised by a handler.
///
/// Client faults answer 400 (or the explicit 4xx status); internal errors
/// answer 500. The optional payload is encoded with the interface's exception
/// type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApplicationError {
    pub class: ErrorClass,
    pub message: String,
    pub status: Option<u16>,
    pub data: Option<Value>,
}

impl ApplicationError {
    pub fn client_fault(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::ClientFault,
            message: message.into(),
            status: None,
            data: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Internal,
            ..Self::client_fault(message)
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Override the status; only honoured for client faults in the 4xx range.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status_code(&self) -> u16 {
        match self.class {
            ErrorClass::ClientFault => self
                .status
                .filter(|s| (400..500).contains(s))
                .unwrap_or(400),
            ErrorClass::Internal => 500,
        }
    }
}

/// A resolved call handed to a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    chain: Vec<Invocation>,
    terminal: Invocation,
}

impl Call {
    pub(crate) fn new(chain: Vec<Invocation>, terminal: Invocation) -> Self {
        Self { chain, terminal }
    }

    /// Chain invocations leading to the terminal method, with their path arguments.
    pub fn chain(&self) -> &[Invocation] {
        &self.chain
    }

    pub fn terminal(&self) -> &Invocation {
        &self.terminal
    }

    /// Terminal method arguments in declaration order.
    pub fn args(&self) -> &[Value] {
        self.terminal.args()
    }

    /// Terminal argument by parameter name.
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.terminal.arg(name)
    }

    /// Argument of the first chain invocation of `method`.
    pub fn chain_arg(&self, method: &str, name: &str) -> Option<&Value> {
        self.chain
            .iter()
            .find(|i| i.method().name() == method)
            .and_then(|i| i.arg(name))
    }
}

/// Implementation of one terminal method. Must tolerate concurrent calls.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, call: Call) -> Result<Value, ApplicationError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApplicationError>> + Send + 'static,
{
    async fn call(&self, call: Call) -> Result<Value, ApplicationError> {
        (self)(call).await
    }
}
