//! Demo service: an in-memory user directory.
//!
//! ```text
//! Directory                      (exception DirectoryError)
//!   POST createUser(name)        -> User
//!   GET  users()                 -> Users
//!   GET  search(status, limit?)  -> list<User>
//!   GET  browse(window)          -> list<User>   (window is a form)
//! Users
//!   GET  user(id)                -> UserResource
//!   GET  named(name)             -> list<User>
//! UserResource
//!   GET  get()                   -> User
//!   POST rename(name)            -> User
//!   POST delete()                -> void
//! ```

use chainrpc::{
    ApplicationError, Call, Dispatcher, EnumDescriptor, Handler, InterfaceDescriptor,
    MethodDescriptor, Registry, StructDescriptor, StructValue, TypeDescriptor, Value,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub const DIRECTORY: &str = "Directory";
pub const USERS: &str = "Users";
pub const USER_RESOURCE: &str = "UserResource";

const USER: &str = "User";
const STATUS: &str = "Status";
const DIRECTORY_ERROR: &str = "DirectoryError";
const WINDOW: &str = "Window";

/// Descriptors of the directory service.
pub fn registry() -> chainrpc::Result<Arc<Registry>> {
    let user = TypeDescriptor::structure(USER);

    Registry::builder()
        .enumeration(EnumDescriptor::new(STATUS, ["ACTIVE", "SUSPENDED"]))
        .structure(
            StructDescriptor::new(USER)
                .field("id", TypeDescriptor::Int64)
                .field("name", TypeDescriptor::String)
                .field("status", TypeDescriptor::enumeration(STATUS))
                .field("created", TypeDescriptor::Date),
        )
        .structure(StructDescriptor::new(DIRECTORY_ERROR).field("reason", TypeDescriptor::String))
        .structure(
            StructDescriptor::new(WINDOW)
                .field("offset", TypeDescriptor::Int32)
                .field("size", TypeDescriptor::Int32)
                .form(),
        )
        .interface(
            InterfaceDescriptor::new(DIRECTORY)
                .exception(TypeDescriptor::structure(DIRECTORY_ERROR))
                .method(
                    MethodDescriptor::post("createUser", user.clone())
                        .param("name", TypeDescriptor::String),
                )
                .method(MethodDescriptor::get("users", TypeDescriptor::interface(USERS)))
                .method(
                    MethodDescriptor::get("search", TypeDescriptor::list(user.clone()))
                        .param("status", TypeDescriptor::enumeration(STATUS))
                        .named_param("limit", TypeDescriptor::Int32),
                )
                .method(
                    MethodDescriptor::get("browse", TypeDescriptor::list(user.clone()))
                        .param("window", TypeDescriptor::structure(WINDOW)),
                ),
        )
        .interface(
            InterfaceDescriptor::new(USERS)
                .method(
                    MethodDescriptor::get("user", TypeDescriptor::interface(USER_RESOURCE))
                        .param("id", TypeDescriptor::Int64),
                )
                .method(
                    MethodDescriptor::get("named", TypeDescriptor::list(user.clone()))
                        .param("name", TypeDescriptor::String),
                ),
        )
        .interface(
            InterfaceDescriptor::new(USER_RESOURCE)
                .method(MethodDescriptor::get("get", user.clone()))
                .method(MethodDescriptor::post("rename", user).param("name", TypeDescriptor::String))
                .method(MethodDescriptor::post("delete", TypeDescriptor::Void)),
        )
        .build()
}

/// A stored user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub created: DateTime<Utc>,
}

impl UserRecord {
    fn to_value(&self) -> Value {
        StructValue::new(USER)
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("status", Value::enumeration(self.status.as_str()))
            .with("created", self.created)
            .into()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: i64,
    users: BTreeMap<i64, UserRecord>,
}

/// In-memory user store shared by all handlers.
#[derive(Debug, Default)]
pub struct UserStore {
    state: RwLock<StoreState>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn insert(&self, name: &str) -> Result<UserRecord, ApplicationError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.name == name) {
            return Err(rejected(409, format!("user {:?} already exists", name), "duplicate"));
        }
        state.next_id += 1;
        let record = UserRecord {
            id: state.next_id,
            name: name.to_string(),
            status: "ACTIVE".to_string(),
            created: Utc::now(),
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<UserRecord, ApplicationError> {
        self.state
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }
}

/// Build a dispatcher serving the directory from `store`.
pub fn dispatcher(store: Arc<UserStore>) -> chainrpc::Result<Dispatcher> {
    let dispatcher = Dispatcher::builder(registry()?, DIRECTORY)
        .bind(DIRECTORY, "createUser", with_store(&store, create_user))
        .bind(DIRECTORY, "search", with_store(&store, search))
        .bind(DIRECTORY, "browse", with_store(&store, browse))
        .bind(USERS, "named", with_store(&store, named))
        .bind(USER_RESOURCE, "get", with_store(&store, get_user))
        .bind(USER_RESOURCE, "rename", with_store(&store, rename_user))
        .bind(USER_RESOURCE, "delete", with_store(&store, delete_user))
        .build()?;
    info!("Directory service ready");
    Ok(dispatcher)
}

fn with_store<F, Fut>(store: &Arc<UserStore>, f: F) -> impl Handler
where
    F: Fn(Arc<UserStore>, Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApplicationError>> + Send + 'static,
{
    let store = store.clone();
    move |call: Call| f(store.clone(), call)
}

async fn create_user(store: Arc<UserStore>, call: Call) -> Result<Value, ApplicationError> {
    let name = required_name(&call)?;
    let record = store.insert(name).await?;
    info!("Created user {} ({})", record.id, record.name);
    Ok(record.to_value())
}

async fn search(store: Arc<UserStore>, call: Call) -> Result<Value, ApplicationError> {
    let status = call.arg("status").and_then(Value::as_str).unwrap_or("ACTIVE");
    let limit = match call.arg("limit").and_then(Value::as_i64) {
        Some(limit) if limit < 0 => {
            return Err(rejected(400, "limit must not be negative", "bad limit"));
        }
        Some(limit) => limit as usize,
        None => usize::MAX,
    };

    let state = store.state.read().await;
    let users = state
        .users
        .values()
        .filter(|u| u.status == status)
        .take(limit)
        .map(UserRecord::to_value)
        .collect();
    Ok(Value::List(users))
}

async fn browse(store: Arc<UserStore>, call: Call) -> Result<Value, ApplicationError> {
    let window = call.arg("window").and_then(Value::as_struct);
    let bound = |field: &str| {
        window
            .and_then(|w| w.get(field))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    let (offset, size) = (bound("offset"), bound("size"));
    if offset < 0 || size < 0 {
        return Err(rejected(400, "window bounds must not be negative", "bad window"));
    }
    // A zero size means no limit.
    let size = if size == 0 { usize::MAX } else { size as usize };

    let state = store.state.read().await;
    let users = state
        .users
        .values()
        .skip(offset as usize)
        .take(size)
        .map(UserRecord::to_value)
        .collect();
    Ok(Value::List(users))
}

async fn named(store: Arc<UserStore>, call: Call) -> Result<Value, ApplicationError> {
    let name = call.arg("name").and_then(Value::as_str).unwrap_or_default();
    let state = store.state.read().await;
    let users = state
        .users
        .values()
        .filter(|u| u.name == name)
        .map(UserRecord::to_value)
        .collect();
    Ok(Value::List(users))
}

async fn get_user(store: Arc<UserStore>, call: Call) -> Result<Value, ApplicationError> {
    let id = user_id(&call)?;
    Ok(store.get(id).await?.to_value())
}

async fn rename_user(store: Arc<UserStore>, call: Call) -> Result<Value, ApplicationError> {
    let id = user_id(&call)?;
    let name = required_name(&call)?;
    let mut state = store.state.write().await;
    if state.users.values().any(|u| u.name == name && u.id != id) {
        return Err(rejected(409, format!("user {:?} already exists", name), "duplicate"));
    }
    let record = state.users.get_mut(&id).ok_or_else(|| not_found(id))?;
    record.name = name.to_string();
    Ok(record.to_value())
}

async fn delete_user(store: Arc<UserStore>, call: Call) -> Result<Value, ApplicationError> {
    let id = user_id(&call)?;
    match store.state.write().await.users.remove(&id) {
        Some(record) => {
            info!("Deleted user {} ({})", record.id, record.name);
            Ok(Value::Null)
        }
        None => Err(not_found(id)),
    }
}

fn user_id(call: &Call) -> Result<i64, ApplicationError> {
    call.chain_arg("user", "id")
        .and_then(Value::as_i64)
        .ok_or_else(|| rejected(400, "user id required", "missing id"))
}

fn required_name(call: &Call) -> Result<&str, ApplicationError> {
    match call.arg("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(rejected(400, "name must not be empty", "empty name")),
    }
}

fn not_found(id: i64) -> ApplicationError {
    rejected(404, format!("no user with id {}", id), "no such user")
}

fn rejected(status: u16, message: impl Into<String>, reason: &str) -> ApplicationError {
    ApplicationError::client_fault(message)
        .with_status(status)
        .with_data(StructValue::new(DIRECTORY_ERROR).with("reason", reason))
}
