//! # Components
//!
//! A component groups related handler methods under one service name. Routes
//! address a method as `Service.Method` (plus an optional server type prefix).
//!
//! Components do not get introspected: each one lists its methods through
//! [`HandlerProvider::methods`], choosing for every method one of the accepted
//! shapes:
//!
//! - **notify**: `(session) -> Result<()>`, no reply is ever sent
//! - **request**: `(session, Request) -> Result<Vec<u8>>`, the reply bytes are
//!   sent back in a response carrying the request id
//! - **remote**: `(payload) -> Result<Vec<u8>>`, server-to-server calls with no
//!   session affinity
//!
//! ## Example
//! ```rust
//! use realtime_dispatch::component::{Component, HandlerProvider, Methods};
//! use std::sync::Arc;
//!
//! struct Room;
//!
//! impl Component for Room {}
//!
//! impl HandlerProvider for Room {
//!     fn methods(self: Arc<Self>) -> Methods {
//!         Methods::new()
//!             .notify("Leave", |_session| async { Ok(()) })
//!             .request("Join", |_session, req| async move { Ok(req.data.to_vec()) })
//!     }
//! }
//! ```

pub mod registry;

pub use registry::ComponentRegistry;

use crate::core::serialization::SerializationFormat;
use crate::error::Result;
use crate::session::Session;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Lifecycle hooks. Every hook has an empty default.
pub trait Component: Send + Sync + 'static {
    /// Called right after the component is registered.
    fn init(&self) {}
    /// Called once every component is registered, when the service starts.
    fn after_init(&self) {}
    /// Called before any component is shut down.
    fn before_shutdown(&self) {}
    fn shutdown(&self) {}
}

/// Exposes the methods a component serves.
pub trait HandlerProvider: Component {
    fn methods(self: Arc<Self>) -> Methods;
}

pub type NotifyFn = Arc<dyn Fn(Arc<Session>) -> BoxFuture<'static, Result<()>> + Send + Sync>;
pub type RequestFn =
    Arc<dyn Fn(Arc<Session>, Request) -> BoxFuture<'static, Result<Vec<u8>>> + Send + Sync>;
pub type RemoteFn = Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<Vec<u8>>> + Send + Sync>;

/// A session-bound handler method.
#[derive(Clone)]
pub enum Handler {
    Notify(NotifyFn),
    Request(RequestFn),
}

impl Handler {
    /// Run the handler. Notify handlers yield an empty payload.
    pub async fn call(&self, session: Arc<Session>, request: Request) -> Result<Vec<u8>> {
        match self {
            Handler::Notify(f) => f(session).await.map(|()| Vec::new()),
            Handler::Request(f) => f(session, request).await,
        }
    }

    pub fn is_notify(&self) -> bool {
        matches!(self, Handler::Notify(_))
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Notify(_) => f.write_str("Handler::Notify"),
            Handler::Request(_) => f.write_str("Handler::Request"),
        }
    }
}

/// Argument of a request handler: the raw payload and the serializer the
/// client negotiated.
#[derive(Debug, Clone)]
pub struct Request {
    pub data: Bytes,
    pub serializer: SerializationFormat,
}

impl Request {
    pub fn new(data: impl Into<Bytes>, serializer: SerializationFormat) -> Self {
        Self {
            data: data.into(),
            serializer,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.serializer.unmarshal(&self.data)
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        self.serializer.marshal(value)
    }
}

/// Method table returned by [`HandlerProvider::methods`].
#[derive(Default)]
pub struct Methods {
    pub(crate) handlers: Vec<(String, Handler)>,
    pub(crate) remotes: Vec<(String, RemoteFn)>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let f: NotifyFn = Arc::new(move |session| f(session).boxed());
        self.handlers.push((name.into(), Handler::Notify(f)));
        self
    }

    pub fn request<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<Session>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        let f: RequestFn = Arc::new(move |session, request| f(session, request).boxed());
        self.handlers.push((name.into(), Handler::Request(f)));
        self
    }

    /// Request handler over typed arguments and replies, both going through
    /// the request's serializer.
    pub fn typed_request<A, R, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<Session>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.request(name, move |session, request: Request| {
            let f = f.clone();
            async move {
                let arg: A = request.decode()?;
                let reply = f(session, arg).await?;
                request.encode(&reply)
            }
        })
    }

    pub fn remote<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        let f: RemoteFn = Arc::new(move |payload| f(payload).boxed());
        self.remotes.push((name.into(), f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.remotes.is_empty()
    }
}

/// Options for [`ComponentRegistry::register`].
#[derive(Clone, Default)]
pub struct RegisterOptions {
    pub name: Option<String>,
    pub name_func: Option<Arc<dyn Fn(&str) -> String + Send + Sync>>,
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `name` instead of the type name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Rewrite every method name, e.g. to lowercase.
    pub fn with_name_func<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.name_func = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("name", &self.name)
            .field("name_func", &self.name_func.is_some())
            .finish()
    }
}

/// Short type name of `C`: last path segment, generic arguments stripped.
pub fn component_name<C: ?Sized>() -> String {
    let full = std::any::type_name::<C>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// A service or method name usable as one segment of a route.
pub(crate) fn is_suitable_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.') && !name.chars().any(char::is_whitespace)
}
