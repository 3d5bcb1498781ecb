//! Invocation chains.
//!
//! A chain records the calls a client makes while navigating from the root
//! interface through chain methods to one terminal method. Each append is
//! validated on the spot, so a chain that seals successfully always describes
//! a request the peer can route.

use crate::error::{Result, RpcError};
use crate::interface::{ArgPlacement, InterfaceDescriptor, MethodDescriptor};
use crate::registry::Registry;
use crate::types::TypeDescriptor;
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

/// One resolved method call with its bound arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    interface: String,
    method: Arc<MethodDescriptor>,
    args: Vec<Value>,
}

impl Invocation {
    pub(crate) fn new(interface: impl Into<String>, method: Arc<MethodDescriptor>, args: Vec<Value>) -> Self {
        Self {
            interface: interface.into(),
            method,
            args,
        }
    }

    /// Name of the interface the method belongs to.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Arguments, one per declared parameter.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Argument bound to the named parameter.
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.method
            .params()
            .iter()
            .position(|p| p.name == name)
            .and_then(|i| self.args.get(i))
    }
}

/// A chain under construction.
#[derive(Debug)]
pub struct InvocationChain {
    registry: Arc<Registry>,
    tail: Arc<InterfaceDescriptor>,
    invocations: Vec<Invocation>,
    sealed: bool,
}

impl InvocationChain {
    /// Start an empty chain at the named root interface.
    pub fn start(registry: Arc<Registry>, root: &str) -> Result<Self> {
        let tail = registry.require_interface(root)?.clone();
        Ok(Self::with_root(registry, tail))
    }

    pub(crate) fn with_root(registry: Arc<Registry>, root: Arc<InterfaceDescriptor>) -> Self {
        Self {
            registry,
            tail: root,
            invocations: Vec::new(),
            sealed: false,
        }
    }

    /// Append a call on the current tail interface.
    ///
    /// A chain method moves the tail to its result interface; any other
    /// method seals the chain.
    pub fn append_call(&mut self, name: &str, args: Vec<Value>) -> Result<&mut Self> {
        if self.sealed {
            let last = self
                .invocations
                .last()
                .map(|i| i.method().name().to_string())
                .unwrap_or_default();
            return Err(RpcError::ChainSealed { method: last });
        }

        let method = self
            .tail
            .find_method(name)
            .cloned()
            .ok_or_else(|| RpcError::UnknownMethod {
                interface: self.tail.name().to_string(),
                method: name.to_string(),
            })?;

        if args.len() != method.params().len() {
            return Err(RpcError::Arity {
                method: name.to_string(),
                expected: method.params().len(),
                actual: args.len(),
            });
        }

        for (param, arg) in method.params().iter().zip(&args) {
            let placement = method.placement(param);
            if !accepts(&self.registry, &param.ty, arg, placement) {
                return Err(RpcError::ArgumentType {
                    method: name.to_string(),
                    param: param.name.clone(),
                    expected: param.ty.to_string(),
                    found: arg.kind_name().to_string(),
                });
            }
        }

        let interface = self.tail.name().to_string();
        match method.result() {
            TypeDescriptor::Interface(next) => {
                self.tail = self.registry.require_interface(next)?.clone();
            }
            _ => self.sealed = true,
        }
        debug!("Appended {}.{} (sealed: {})", interface, name, self.sealed);
        self.invocations.push(Invocation::new(interface, method, args));
        Ok(self)
    }

    /// Builder-style [`append_call`](Self::append_call).
    pub fn call(mut self, name: &str, args: Vec<Value>) -> Result<Self> {
        self.append_call(name, args)?;
        Ok(self)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Interface the next call is resolved against.
    pub fn tail(&self) -> &InterfaceDescriptor {
        &self.tail
    }

    /// Freeze a terminated chain.
    pub fn seal(self) -> Result<SealedChain> {
        if !self.sealed {
            return Err(RpcError::IncompleteChain {
                interface: self.tail.name().to_string(),
            });
        }
        Ok(SealedChain {
            registry: self.registry,
            invocations: self.invocations.into(),
        })
    }
}

/// An immutable chain ending in a terminal invocation.
#[derive(Debug, Clone)]
pub struct SealedChain {
    registry: Arc<Registry>,
    invocations: Arc<[Invocation]>,
}

impl SealedChain {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Chain invocations preceding the terminal one.
    pub fn chain(&self) -> &[Invocation] {
        let len = self.invocations.len();
        &self.invocations[..len.saturating_sub(1)]
    }

    pub fn terminal(&self) -> &Invocation {
        // A sealed chain always holds its terminal invocation.
        &self.invocations[self.invocations.len() - 1]
    }

    /// Struct type application error payloads decode against.
    pub fn exception_type(&self) -> Option<&TypeDescriptor> {
        exception_type(&self.registry, &self.invocations)
    }
}

/// Exception type of the innermost interface along `invocations` that declares one.
pub(crate) fn exception_type<'r>(
    registry: &'r Registry,
    invocations: &[Invocation],
) -> Option<&'r TypeDescriptor> {
    invocations
        .iter()
        .rev()
        .filter_map(|i| registry.interface(i.interface()))
        .find_map(|iface| iface.exception_type())
}

/// Coarse compatibility check; the codec does the precise one.
fn accepts(registry: &Registry, ty: &TypeDescriptor, value: &Value, placement: ArgPlacement) -> bool {
    if value.is_null() {
        return placement != ArgPlacement::Path;
    }
    match ty {
        TypeDescriptor::Bool => matches!(value, Value::Bool(_)),
        TypeDescriptor::Int16 | TypeDescriptor::Int32 | TypeDescriptor::Int64 => {
            value.as_i64().is_some()
        }
        TypeDescriptor::Float | TypeDescriptor::Double => value.as_f64().is_some(),
        TypeDescriptor::String => matches!(value, Value::String(_)),
        TypeDescriptor::Date => matches!(value, Value::Date(_)),
        TypeDescriptor::Enum(_) => matches!(value, Value::Enum(_) | Value::String(_)),
        TypeDescriptor::List(_) | TypeDescriptor::Set(_) => value.as_slice().is_some(),
        TypeDescriptor::Map(_, _) => matches!(value, Value::Map(_)),
        TypeDescriptor::Struct(name) => value
            .as_struct()
            .map(|s| registry.is_subtype(s.type_name(), name))
            .unwrap_or(false),
        TypeDescriptor::Void | TypeDescriptor::Interface(_) | TypeDescriptor::Undefined => false,
    }
}
