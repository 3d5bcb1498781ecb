//! Interface and method descriptors.

use crate::types::TypeDescriptor;
use std::fmt;
use std::sync::Arc;

/// HTTP verb a method is invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpVerb {
    #[default]
    Get,
    Post,
}

impl HttpVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("GET") {
            Some(HttpVerb::Get)
        } else if s.eq_ignore_ascii_case("POST") {
            Some(HttpVerb::Post)
        } else {
            None
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an argument travels in an HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgPlacement {
    /// A URL path segment after the method name.
    Path,
    /// A `name=value` query parameter.
    Query,
    /// A member of the JSON body object.
    Body,
}

/// Method parameter descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    /// Named parameters of GET methods always travel in the query string.
    pub named: bool,
}

/// Interface method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    verb: HttpVerb,
    params: Vec<ParamDescriptor>,
    result: TypeDescriptor,
}

impl MethodDescriptor {
    /// Create a GET method.
    pub fn get(name: impl Into<String>, result: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            verb: HttpVerb::Get,
            params: Vec::new(),
            result,
        }
    }

    /// Create a POST method.
    pub fn post(name: impl Into<String>, result: TypeDescriptor) -> Self {
        Self {
            verb: HttpVerb::Post,
            ..Self::get(name, result)
        }
    }

    /// Append a positional parameter.
    pub fn param(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.params.push(ParamDescriptor {
            name: name.into(),
            ty,
            named: false,
        });
        self
    }

    /// Append a named parameter.
    pub fn named_param(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.params.push(ParamDescriptor {
            name: name.into(),
            ty,
            named: true,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn verb(&self) -> HttpVerb {
        self.verb
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    pub fn result(&self) -> &TypeDescriptor {
        &self.result
    }

    /// A chain method returns another interface.
    pub fn is_chain(&self) -> bool {
        self.result.is_interface()
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_chain()
    }

    /// Decide where an argument of this method travels.
    pub fn placement(&self, param: &ParamDescriptor) -> ArgPlacement {
        if self.is_chain() {
            return ArgPlacement::Path;
        }
        match self.verb {
            HttpVerb::Post => ArgPlacement::Body,
            HttpVerb::Get if param.ty.is_scalar() && !param.named => ArgPlacement::Path,
            HttpVerb::Get => ArgPlacement::Query,
        }
    }
}

/// Interface descriptor: an ordered list of methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    name: String,
    methods: Vec<Arc<MethodDescriptor>>,
    exception: Option<TypeDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            exception: None,
        }
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Declare the struct type that application error payloads are encoded with.
    pub fn exception(mut self, ty: TypeDescriptor) -> Self {
        self.exception = Some(ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    pub fn exception_type(&self) -> Option<&TypeDescriptor> {
        self.exception.as_ref()
    }

    pub fn find_method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.iter().find(|m| m.name() == name)
    }
}
