//! Route table of registered components.
//!
//! Registration takes `&mut self`, so the table is filled before the owning
//! service is shared and lookups afterwards are plain `HashMap` reads.

use super::{
    component_name, is_suitable_name, Handler, HandlerProvider, RegisterOptions, RemoteFn,
};
use crate::error::{ProtocolError, Result};
use crate::utils::guard::guarded;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A registered component and the keys it owns.
struct Service {
    name: String,
    component: Arc<dyn HandlerProvider>,
}

#[derive(Default)]
pub struct ComponentRegistry {
    services: Vec<Service>,
    handlers: HashMap<String, Handler>,
    remotes: HashMap<String, RemoteFn>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` and every suitable method it exposes.
    ///
    /// Fails without touching the registry if the name is taken or invalid,
    /// if two methods end up with the same key, or if no method qualifies.
    #[instrument(skip_all)]
    pub fn register<C: HandlerProvider>(
        &mut self,
        component: Arc<C>,
        options: RegisterOptions,
    ) -> Result<()> {
        let type_name = component_name::<C>();
        let name = options.name.clone().unwrap_or_else(|| type_name.clone());

        if self.services.iter().any(|s| s.name == name) {
            return Err(ProtocolError::ServiceAlreadyDefined(name));
        }
        if !is_suitable_name(&name) {
            return Err(ProtocolError::InvalidRoute(format!(
                "component name {name:?} cannot be used as a route segment"
            )));
        }

        let rename = |method: &str| match &options.name_func {
            Some(f) => f(method),
            None => method.to_string(),
        };

        let methods = component.clone().methods();
        let mut handlers = Vec::with_capacity(methods.handlers.len());
        for (method, handler) in methods.handlers {
            let method = rename(&method);
            if !is_suitable_name(&method) {
                debug!(service = %name, method = %method, "Skipping unsuitable handler method");
                continue;
            }
            let key = format!("{name}.{method}");
            if handlers.iter().any(|(k, _)| *k == key) {
                return Err(ProtocolError::MethodAlreadyDefined(key));
            }
            handlers.push((key, handler));
        }
        let mut remotes = Vec::with_capacity(methods.remotes.len());
        for (method, remote) in methods.remotes {
            let method = rename(&method);
            if !is_suitable_name(&method) {
                debug!(service = %name, method = %method, "Skipping unsuitable remote method");
                continue;
            }
            let key = format!("{name}.{method}");
            if remotes.iter().any(|(k, _)| *k == key) {
                return Err(ProtocolError::MethodAlreadyDefined(key));
            }
            remotes.push((key, remote));
        }

        if handlers.is_empty() && remotes.is_empty() {
            return Err(ProtocolError::NoSuitableMethods(type_name));
        }

        info!(
            service = %name,
            handlers = handlers.len(),
            remotes = remotes.len(),
            "Component registered"
        );
        self.handlers.extend(handlers);
        self.remotes.extend(remotes);
        self.services.push(Service {
            name,
            component: component.clone(),
        });
        component.init();
        Ok(())
    }

    pub fn handler(&self, key: &str) -> Option<&Handler> {
        self.handlers.get(key)
    }

    pub fn remote(&self, key: &str) -> Option<&RemoteFn> {
        self.remotes.get(key)
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn HandlerProvider>> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.component.clone())
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Handler keys, unordered.
    pub fn handler_keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Run the remote method registered under `key`.
    pub async fn invoke_remote(&self, key: &str, payload: Bytes) -> Result<Vec<u8>> {
        let remote = self
            .remotes
            .get(key)
            .ok_or_else(|| ProtocolError::RouteNotFound(key.to_string()))?;
        guarded(remote(payload)).await
    }

    pub fn after_init_all(&self) {
        for service in &self.services {
            service.component.after_init();
        }
    }

    /// `before_shutdown` on every component, then `shutdown` on every
    /// component, both in registration order.
    pub fn shutdown_all(&self) {
        for service in &self.services {
            service.component.before_shutdown();
        }
        for service in &self.services {
            debug!(service = %service.name, "Shutting down component");
            service.component.shutdown();
        }
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("services", &self.services.len())
            .field("handlers", &self.handlers.len())
            .field("remotes", &self.remotes.len())
            .finish()
    }
}
