//! Server dispatcher: routes a request through the interface tree to a handler.
//!
//! Each request goes through four stages:
//! 1. Split the path into segments.
//! 2. Resolve segments against the interface tree, decoding arguments.
//! 3. Invoke the handler bound to the terminal method.
//! 4. Respond with a success or error envelope.
//!
//! Failures in stages 1 and 2 never reach a handler. Every outcome, including
//! handler errors, becomes a [`ServerResponse`].

use super::handler::{ApplicationError, Call, ErrorClass, Handler};
use crate::chain::{exception_type, Invocation};
use crate::codec::{decode_path_segment, JsonCodec};
use crate::config::WireConfig;
use crate::envelope::{success_body, ErrorEnvelope};
use crate::error::{Result, RpcError};
use crate::interface::{ArgPlacement, HttpVerb, InterfaceDescriptor, MethodDescriptor, ParamDescriptor};
use crate::registry::Registry;
use crate::types::TypeDescriptor;
use crate::value::Value;
use serde_json::{Map, Value as Json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// An incoming request as seen by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerRequest {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Raw (still percent-encoded) path.
    pub path: String,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    pub body: String,
}

impl ServerRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpVerb::Get.as_str().to_string(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpVerb::Post.as_str().to_string(),
            path: path.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }
}

/// The dispatcher's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ServerResponse {
    fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: WireConfig::JSON_CONTENT_TYPE,
            body,
        }
    }

    fn error(envelope: ErrorEnvelope) -> Self {
        Self::json(envelope.code, envelope.to_json_string())
    }
}

type HandlerKey = (String, String);

/// Routes requests for one root interface to bound handlers.
pub struct Dispatcher {
    registry: Arc<Registry>,
    root: Arc<InterfaceDescriptor>,
    handlers: HashMap<HandlerKey, Arc<dyn Handler>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bound: Vec<String> = self
            .handlers
            .keys()
            .map(|(i, m)| format!("{}.{}", i, m))
            .collect();
        bound.sort();
        f.debug_struct("Dispatcher")
            .field("root", &self.root.name())
            .field("handlers", &bound)
            .finish()
    }
}

/// A request resolved down to its terminal method.
struct Resolved {
    interface: Arc<InterfaceDescriptor>,
    call: Call,
}

impl Dispatcher {
    pub fn builder(registry: Arc<Registry>, root: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            root: root.into(),
            bindings: Vec::new(),
        }
    }

    pub fn root(&self) -> &InterfaceDescriptor {
        &self.root
    }

    /// Handle one request. Never fails: errors become error envelopes.
    pub async fn dispatch(&self, request: ServerRequest) -> ServerResponse {
        debug!("Dispatching {} {}", request.method, request.path);

        let resolved = match self.resolve(&request) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Rejected {} {}: {}", request.method, request.path, e);
                return rpc_error_response(&e);
            }
        };

        let interface = resolved.interface.name().to_string();
        let method = resolved.call.terminal().method().name().to_string();
        let Some(handler) = self.handlers.get(&(interface.clone(), method.clone())) else {
            error!("No handler bound for {}.{}", interface, method);
            return rpc_error_response(&RpcError::ServerInternal {
                status: 500,
                message: format!("no handler bound for {}.{}", interface, method),
            });
        };

        let result_type = resolved.call.terminal().method().result().clone();
        let exception = self.exception_type(&resolved.call);
        debug!("Invoking {}.{}", interface, method);

        match handler.call(resolved.call).await {
            Ok(value) => self.success_response(&value, &result_type, &method),
            Err(app) => self.application_error_response(app, exception.as_ref(), &method),
        }
    }

    fn resolve(&self, request: &ServerRequest) -> Result<Resolved> {
        let codec = self.registry.codec();
        let segments = split_path(&request.path);
        if segments == [""] {
            return Err(RpcError::NotFound {
                message: "empty path".to_string(),
            });
        }

        let mut segments = segments.into_iter();
        let mut interface = self.root.clone();
        let mut chain = Vec::new();

        loop {
            let Some(raw) = segments.next() else {
                return Err(RpcError::NotFound {
                    message: format!("path ends on interface {}", interface.name()),
                });
            };
            let name = decode_path_segment(raw)?;
            let method = interface
                .find_method(&name)
                .cloned()
                .ok_or_else(|| RpcError::NotFound {
                    message: format!("no method {:?} in interface {}", name, interface.name()),
                })?;

            if let TypeDescriptor::Interface(next) = method.result() {
                let mut args = Vec::with_capacity(method.params().len());
                for param in method.params() {
                    let raw = segments.next().ok_or_else(|| missing(&method, param))?;
                    args.push(path_arg(&codec, raw, param)?);
                }
                let next = self.registry.require_interface(next)?.clone();
                debug!("Resolved chain method {}.{}", interface.name(), method.name());
                chain.push(Invocation::new(interface.name(), method, args));
                interface = next;
                continue;
            }

            if HttpVerb::parse(&request.method) != Some(method.verb()) {
                return Err(RpcError::MethodNotAllowed {
                    message: format!(
                        "{}.{} requires {}, got {}",
                        interface.name(),
                        method.name(),
                        method.verb(),
                        request.method
                    ),
                });
            }

            let body = match method.verb() {
                HttpVerb::Post => body_object(&request.body)?,
                HttpVerb::Get => Map::new(),
            };

            let mut args = Vec::with_capacity(method.params().len());
            for param in method.params() {
                let form = self.registry.form_struct(&param.ty).is_some();
                let value = match method.placement(param) {
                    ArgPlacement::Path => {
                        let raw = segments.next().ok_or_else(|| missing(&method, param))?;
                        path_arg(&codec, raw, param)?
                    }
                    ArgPlacement::Query if form => codec
                        .from_form(&param.ty, |field| request.query.get(field).map(String::as_str))
                        .map_err(|e| bad_argument(param, e))?,
                    ArgPlacement::Body if form => codec
                        .decode_at(&Json::Object(body.clone()), &param.ty, &param.name)
                        .map_err(|e| bad_argument(param, e))?,
                    ArgPlacement::Query => match request.query.get(&param.name) {
                        Some(text) => codec
                            .from_text(text, &param.ty, &param.name)
                            .map_err(|e| bad_argument(param, e))?,
                        None => Value::Null,
                    },
                    ArgPlacement::Body => match body.get(&param.name) {
                        Some(json) => codec
                            .decode_at(json, &param.ty, &param.name)
                            .map_err(|e| bad_argument(param, e))?,
                        None => Value::Null,
                    },
                };
                args.push(value);
            }

            // A single trailing slash leaves one empty segment behind.
            let rest: Vec<&str> = segments.collect();
            if !rest.is_empty() && rest != [""] {
                return Err(RpcError::NotFound {
                    message: format!(
                        "unexpected path segments after {}.{}: {}",
                        interface.name(),
                        method.name(),
                        rest.join("/")
                    ),
                });
            }

            debug!("Resolved terminal method {}.{}", interface.name(), method.name());
            let terminal = Invocation::new(interface.name(), method, args);
            return Ok(Resolved {
                interface,
                call: Call::new(chain, terminal),
            });
        }
    }

    fn exception_type(&self, call: &Call) -> Option<TypeDescriptor> {
        let mut invocations = call.chain().to_vec();
        invocations.push(call.terminal().clone());
        exception_type(&self.registry, &invocations).cloned()
    }

    fn success_response(&self, value: &Value, ty: &TypeDescriptor, method: &str) -> ServerResponse {
        match self.registry.codec().encode(value, ty) {
            Ok(data) => {
                debug!("{} succeeded", method);
                ServerResponse::json(200, success_body(data))
            }
            Err(e) => {
                error!("Failed to encode result of {}: {}", method, e);
                ServerResponse::error(ErrorEnvelope::new(500, format!("result encoding failed: {}", e)))
            }
        }
    }

    fn application_error_response(
        &self,
        app: ApplicationError,
        exception: Option<&TypeDescriptor>,
        method: &str,
    ) -> ServerResponse {
        let status = app.status_code();
        match app.class {
            ErrorClass::ClientFault => warn!("{} rejected the call ({}): {}", method, status, app),
            ErrorClass::Internal => error!("{} failed: {}", method, app),
        }

        let mut envelope = ErrorEnvelope::new(status, app.message);
        if let Some(data) = app.data {
            match exception {
                Some(ty) => match self.registry.codec().encode(&data, ty) {
                    Ok(json) => envelope = envelope.with_data(json),
                    Err(e) => warn!("Dropping error payload of {}: {}", method, e),
                },
                None => warn!("Dropping error payload of {}: no exception type declared", method),
            }
        }
        ServerResponse::error(envelope)
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: Arc<Registry>,
    root: String,
    bindings: Vec<(HandlerKey, Arc<dyn Handler>)>,
}

impl DispatcherBuilder {
    /// Bind a handler to a terminal method.
    pub fn bind<H: Handler>(
        mut self,
        interface: impl Into<String>,
        method: impl Into<String>,
        handler: H,
    ) -> Self {
        self.bindings
            .push(((interface.into(), method.into()), Arc::new(handler)));
        self
    }

    /// Validate bindings against the interface tree reachable from the root.
    pub fn build(self) -> Result<Dispatcher> {
        let root = self.registry.require_interface(&self.root)?.clone();
        let reachable = reachable_interfaces(&self.registry, &root);

        let mut handlers = HashMap::with_capacity(self.bindings.len());
        for ((interface, method), handler) in self.bindings {
            if !reachable.contains(interface.as_str()) {
                return Err(RpcError::registration(format!(
                    "interface {} is not reachable from {}",
                    interface,
                    root.name()
                )));
            }
            let descriptor = self
                .registry
                .require_interface(&interface)?
                .find_method(&method)
                .ok_or_else(|| {
                    RpcError::registration(format!("no method {}.{}", interface, method))
                })?;
            if descriptor.is_chain() {
                return Err(RpcError::registration(format!(
                    "{}.{} is a chain method and cannot be bound",
                    interface, method
                )));
            }
            let key = (interface, method);
            if handlers.contains_key(&key) {
                return Err(RpcError::registration(format!(
                    "{}.{} is bound twice",
                    key.0, key.1
                )));
            }
            handlers.insert(key, handler);
        }

        for name in &reachable {
            if let Some(iface) = self.registry.interface(name) {
                for method in iface.methods().iter().filter(|m| m.is_terminal()) {
                    if !handlers.contains_key(&(name.to_string(), method.name().to_string())) {
                        debug!("{}.{} has no handler", name, method.name());
                    }
                }
            }
        }

        debug!(
            "Dispatcher built for {} with {} handlers",
            root.name(),
            handlers.len()
        );
        Ok(Dispatcher {
            registry: self.registry,
            root,
            handlers,
        })
    }
}

fn reachable_interfaces<'r>(registry: &'r Registry, root: &'r InterfaceDescriptor) -> HashSet<&'r str> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([root]);
    seen.insert(root.name());
    while let Some(iface) = queue.pop_front() {
        for method in iface.methods() {
            if let TypeDescriptor::Interface(next) = method.result() {
                if let Some(next) = registry.interface(next) {
                    if seen.insert(next.name()) {
                        queue.push_back(next.as_ref());
                    }
                }
            }
        }
    }
    seen
}

/// Split a path into raw segments, keeping empty ones.
fn split_path(path: &str) -> Vec<&str> {
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}

fn body_object(body: &str) -> Result<Map<String, Json>> {
    if body.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Json>(body) {
        Ok(Json::Object(object)) => Ok(object),
        Ok(_) => Err(RpcError::BadRequest {
            message: "request body must be a JSON object".to_string(),
        }),
        Err(e) => Err(RpcError::BadRequest {
            message: format!("malformed request body: {}", e),
        }),
    }
}

/// Path arguments are never null; an empty non-string segment is missing.
fn path_arg(codec: &JsonCodec<'_>, raw: &str, param: &ParamDescriptor) -> Result<Value> {
    let text = decode_path_segment(raw)?;
    match codec.from_text(&text, &param.ty, &param.name) {
        Ok(Value::Null) => Err(RpcError::BadRequest {
            message: format!("missing argument {:?}", param.name),
        }),
        other => other.map_err(|e| bad_argument(param, e)),
    }
}

fn missing(method: &MethodDescriptor, param: &ParamDescriptor) -> RpcError {
    RpcError::BadRequest {
        message: format!("missing argument {:?} of method {}", param.name, method.name()),
    }
}

fn bad_argument(param: &ParamDescriptor, e: RpcError) -> RpcError {
    match e {
        RpcError::BadRequest { .. } => e,
        other => RpcError::BadRequest {
            message: format!("invalid argument {:?}: {}", param.name, other),
        },
    }
}

fn rpc_error_response(e: &RpcError) -> ServerResponse {
    ServerResponse::error(ErrorEnvelope::new(e.status_code(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::interface::MethodDescriptor;
    use crate::types::{EnumDescriptor, StructDescriptor};
    use crate::value::StructValue;
    use serde_json::json;
    use std::sync::Mutex;

    fn registry() -> Arc<Registry> {
        Registry::builder()
            .enumeration(EnumDescriptor::new("Status", ["ACTIVE", "INACTIVE"]))
            .structure(
                StructDescriptor::new("User")
                    .field("id", TypeDescriptor::Int64)
                    .field("name", TypeDescriptor::String),
            )
            .structure(StructDescriptor::new("Problem").field("reason", TypeDescriptor::String))
            .structure(
                StructDescriptor::new("Page")
                    .field("offset", TypeDescriptor::Int32)
                    .field("size", TypeDescriptor::Int32)
                    .form(),
            )
            .interface(
                InterfaceDescriptor::new("Directory")
                    .exception(TypeDescriptor::structure("Problem"))
                    .method(
                        MethodDescriptor::post("createUser", TypeDescriptor::structure("User"))
                            .param("name", TypeDescriptor::String),
                    )
                    .method(
                        MethodDescriptor::get("user", TypeDescriptor::interface("UserResource"))
                            .param("id", TypeDescriptor::Int64),
                    )
                    .method(
                        MethodDescriptor::get("search", TypeDescriptor::list(TypeDescriptor::Int64))
                            .param("status", TypeDescriptor::enumeration("Status"))
                            .named_param("limit", TypeDescriptor::Int32)
                            .param("active", TypeDescriptor::Bool),
                    )
                    .method(MethodDescriptor::get("unbound", TypeDescriptor::Void))
                    .method(
                        MethodDescriptor::get("echo", TypeDescriptor::String)
                            .param("text", TypeDescriptor::String),
                    )
                    .method(
                        MethodDescriptor::get("list", TypeDescriptor::structure("Page"))
                            .param("page", TypeDescriptor::structure("Page"))
                            .named_param("q", TypeDescriptor::String),
                    )
                    .method(
                        MethodDescriptor::post("bulk", TypeDescriptor::structure("Page"))
                            .param("label", TypeDescriptor::String)
                            .param("page", TypeDescriptor::structure("Page")),
                    ),
            )
            .interface(
                InterfaceDescriptor::new("UserResource")
                    .method(MethodDescriptor::get("get", TypeDescriptor::structure("User")))
                    .method(MethodDescriptor::post("delete", TypeDescriptor::Void)),
            )
            .interface(InterfaceDescriptor::new("Orphan").method(MethodDescriptor::get("x", TypeDescriptor::Void)))
            .build()
            .unwrap()
    }

    fn user(id: i64, name: &str) -> Value {
        StructValue::new("User").with("id", id).with("name", name).into()
    }

    fn dispatcher(calls: Arc<Mutex<Vec<Call>>>) -> Dispatcher {
        let seen = calls.clone();
        let create = move |call: Call| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(call.clone());
                match call.arg("name").and_then(Value::as_str) {
                    Some("taken") => Err(ApplicationError::client_fault("name taken")
                        .with_status(409)
                        .with_data(StructValue::new("Problem").with("reason", "duplicate"))),
                    Some("crash") => Err(ApplicationError::internal("store offline")),
                    Some(name) => Ok(user(1, name)),
                    None => Err(ApplicationError::client_fault("name required")),
                }
            }
        };
        let get = |call: Call| async move {
            let id = call.chain_arg("user", "id").and_then(Value::as_i64).unwrap_or(-1);
            Ok::<_, ApplicationError>(user(id, "someone"))
        };
        // Echoes the decoded arguments back as numbers.
        let search = |call: Call| async move {
            let mut out = vec![Value::from(call.arg("status").and_then(Value::as_str) == Some("ACTIVE"))];
            out.push(call.arg("limit").cloned().unwrap_or_default());
            out.push(call.arg("active").cloned().unwrap_or_default());
            Ok::<_, ApplicationError>(Value::List(
                out.into_iter()
                    .map(|v| match v {
                        Value::Bool(b) => Value::Int64(b as i64),
                        Value::Int32(n) => Value::Int64(n.into()),
                        _ => Value::Int64(-1),
                    })
                    .collect(),
            ))
        };
        let delete = |_call: Call| async move { Ok::<_, ApplicationError>(Value::Null) };
        let echo = |call: Call| async move {
            Ok::<_, ApplicationError>(call.arg("text").cloned().unwrap_or_default())
        };
        let page = |call: Call| async move {
            Ok::<_, ApplicationError>(call.arg("page").cloned().unwrap_or_default())
        };

        Dispatcher::builder(registry(), "Directory")
            .bind("Directory", "createUser", create)
            .bind("UserResource", "get", get)
            .bind("Directory", "search", search)
            .bind("UserResource", "delete", delete)
            .bind("Directory", "echo", echo)
            .bind("Directory", "list", page)
            .bind("Directory", "bulk", page)
            .build()
            .unwrap()
    }

    fn parse(response: &ServerResponse) -> Envelope {
        Envelope::parse(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_create_user() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = dispatcher(calls.clone());
        let response = dispatcher
            .dispatch(ServerRequest::post("/createUser", r#"{"name":"a"}"#))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(parse(&response), Envelope::Success(json!({"id": 1, "name": "a"})));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args(), &[Value::from("a")]);
    }

    #[tokio::test]
    async fn test_missing_method_is_not_found() {
        let dispatcher = dispatcher(Arc::default());
        for path in ["/missingMethod", "/", "", "/user/1", "/user/1/get/extra"] {
            let response = dispatcher.dispatch(ServerRequest::get(path)).await;
            assert_eq!(response.status, 404, "path {:?}", path);
            assert!(matches!(parse(&response), Envelope::Error(ErrorEnvelope { code: 404, .. })));
        }
    }

    #[tokio::test]
    async fn test_chain_resolution() {
        let dispatcher = dispatcher(Arc::default());
        for path in ["/user/42/get", "/user/42/get/"] {
            let response = dispatcher.dispatch(ServerRequest::get(path)).await;
            assert_eq!(response.status, 200);
            assert_eq!(parse(&response), Envelope::Success(json!({"id": 42, "name": "someone"})));
        }
    }

    #[tokio::test]
    async fn test_bad_arguments() {
        let dispatcher = dispatcher(Arc::default());
        let cases = [
            ServerRequest::get("/user/abc/get"),
            ServerRequest::get("/user"),
            ServerRequest::get("/search/bogus/true"),
            ServerRequest::get("/search/ACTIVE/true").with_query("limit", "many"),
            ServerRequest::post("/createUser", "[1]"),
            ServerRequest::post("/createUser", "{"),
            ServerRequest::post("/createUser", r#"{"name": 5}"#),
        ];
        for request in cases {
            let path = request.path.clone();
            let response = dispatcher.dispatch(request).await;
            assert_eq!(response.status, 400, "path {:?}", path);
        }
    }

    #[tokio::test]
    async fn test_verb_mismatch() {
        let dispatcher = dispatcher(Arc::default());
        let response = dispatcher.dispatch(ServerRequest::get("/createUser")).await;
        assert_eq!(response.status, 405);
        let response = dispatcher.dispatch(ServerRequest::post("/user/1/get", "")).await;
        assert_eq!(response.status, 405);
        let mut request = ServerRequest::get("/user/1/get");
        request.method = "PUT".into();
        assert_eq!(dispatcher.dispatch(request).await.status, 405);
    }

    #[tokio::test]
    async fn test_get_arguments_from_path_and_query() {
        let dispatcher = dispatcher(Arc::default());
        let response = dispatcher
            .dispatch(ServerRequest::get("/search/active/1").with_query("limit", "10"))
            .await;
        assert_eq!(parse(&response), Envelope::Success(json!([1, 10, 1])));

        // Absent query arguments decode as null.
        let response = dispatcher.dispatch(ServerRequest::get("/search/INACTIVE/false")).await;
        assert_eq!(parse(&response), Envelope::Success(json!([0, -1, 0])));
    }

    #[tokio::test]
    async fn test_application_errors() {
        let dispatcher = dispatcher(Arc::default());
        let response = dispatcher
            .dispatch(ServerRequest::post("/createUser", r#"{"name":"taken"}"#))
            .await;
        assert_eq!(response.status, 409);
        assert_eq!(
            parse(&response),
            Envelope::Error(ErrorEnvelope {
                code: 409,
                message: "name taken".into(),
                data: Some(json!({"reason": "duplicate"})),
            })
        );

        let response = dispatcher
            .dispatch(ServerRequest::post("/createUser", r#"{"name":"crash"}"#))
            .await;
        assert_eq!(response.status, 500);

        // Absent body members decode as null.
        let response = dispatcher.dispatch(ServerRequest::post("/createUser", "")).await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_void_result_and_unbound_method() {
        let dispatcher = dispatcher(Arc::default());
        let response = dispatcher.dispatch(ServerRequest::post("/user/3/delete", "")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"data":null}"#);

        let response = dispatcher.dispatch(ServerRequest::get("/unbound")).await;
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_build_validates_bindings() {
        let noop = |_call: Call| async move { Ok::<_, ApplicationError>(Value::Null) };
        let cases = [
            ("Directory", "user"),
            ("Directory", "missing"),
            ("Orphan", "x"),
            ("Nowhere", "x"),
        ];
        for (interface, method) in cases {
            let result = Dispatcher::builder(registry(), "Directory")
                .bind(interface, method, noop)
                .build();
            assert!(
                matches!(result, Err(RpcError::Registration { .. })),
                "{}.{} should be rejected",
                interface,
                method
            );
        }
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/a/1/b"), vec!["a", "1", "b"]);
        assert_eq!(split_path("/a/1/b/"), vec!["a", "1", "b", ""]);
        assert_eq!(split_path("/a//b"), vec!["a", "", "b"]);
        assert_eq!(split_path("/echo/"), vec!["echo", ""]);
        assert_eq!(split_path("/"), vec![""]);
    }

    /// What the client would put on the wire for a chain on the test registry.
    fn compiled(calls: Vec<(&str, Vec<Value>)>) -> ServerRequest {
        let mut chain = crate::chain::InvocationChain::start(registry(), "Directory").unwrap();
        for (name, args) in calls {
            chain.append_call(name, args).unwrap();
        }
        let request = crate::client::compile(&chain.seal().unwrap()).unwrap();
        let mut server = ServerRequest {
            method: request.verb.as_str().to_string(),
            path: request.path,
            body: request.body.unwrap_or_default(),
            ..Default::default()
        };
        for (name, value) in request.query {
            server = server.with_query(name, value);
        }
        server
    }

    #[tokio::test]
    async fn test_empty_string_path_argument_round_trips() {
        let dispatcher = dispatcher(Arc::default());
        for text in ["", "a b/c", " "] {
            let request = compiled(vec![("echo", vec![text.into()])]);
            let response = dispatcher.dispatch(request).await;
            assert_eq!(response.status, 200, "text {:?}", text);
            assert_eq!(parse(&response), Envelope::Success(json!(text)));
        }
    }

    #[tokio::test]
    async fn test_empty_segment_only_tolerated_at_the_end() {
        let dispatcher = dispatcher(Arc::default());
        let response = dispatcher.dispatch(ServerRequest::get("/echo//")).await;
        assert_eq!(parse(&response), Envelope::Success(json!("")));

        for path in ["/echo///", "/user/1/"] {
            let response = dispatcher.dispatch(ServerRequest::get(path)).await;
            assert_eq!(response.status, 404, "path {:?}", path);
        }
        let response = dispatcher.dispatch(ServerRequest::get("/user//get")).await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_form_argument_read_from_query_fields() {
        let dispatcher = dispatcher(Arc::default());
        let page = StructValue::new("Page").with("offset", 20).with("size", 5);
        let request = compiled(vec![("list", vec![page.clone().into(), "x".into()])]);
        assert_eq!(request.query.get("offset").map(String::as_str), Some("20"));
        let response = dispatcher.dispatch(request).await;
        assert_eq!(parse(&response), Envelope::Success(json!({"offset": 20, "size": 5})));

        let response = dispatcher
            .dispatch(ServerRequest::get("/list").with_query("size", "3"))
            .await;
        assert_eq!(parse(&response), Envelope::Success(json!({"offset": 0, "size": 3})));

        let response = dispatcher
            .dispatch(ServerRequest::get("/list").with_query("offset", "ten"))
            .await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_form_argument_read_from_body_members() {
        let dispatcher = dispatcher(Arc::default());
        let page = StructValue::new("Page").with("offset", 1).with("size", 2);
        let request = compiled(vec![("bulk", vec!["all".into(), page.into()])]);
        assert_eq!(request.body, r#"{"label":"all","offset":1,"size":2}"#);
        let response = dispatcher.dispatch(request).await;
        assert_eq!(parse(&response), Envelope::Success(json!({"offset": 1, "size": 2})));
    }
}
