//! Forwarding of messages addressed to other server types.
//!
//! The cluster RPC transport is not part of this crate. The dispatcher only
//! needs something implementing [`RemoteService`]; [`LoopbackRemoteService`]
//! serves remote routes from an in-process registry, which is what single-node
//! deployments and tests use.

use crate::component::ComponentRegistry;
use crate::core::message::Message;
use crate::error::{ProtocolError, Result};
use crate::protocol::route::Route;
use crate::session::SessionContext;
use async_trait::async_trait;
use tracing::{debug, instrument};

#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Process `message` on a server of type `route.server_type`, returning
    /// the reply payload.
    async fn remote_process(
        &self,
        route: &Route,
        session: &SessionContext,
        message: &Message,
    ) -> Result<Vec<u8>>;
}

/// Serves remote routes from a local registry of remote methods.
#[derive(Debug)]
pub struct LoopbackRemoteService {
    server_type: String,
    registry: ComponentRegistry,
}

impl LoopbackRemoteService {
    /// Answers routes addressed to `server_type` from `registry`.
    pub fn new(server_type: impl Into<String>, registry: ComponentRegistry) -> Self {
        Self {
            server_type: server_type.into(),
            registry,
        }
    }

    pub fn server_type(&self) -> &str {
        &self.server_type
    }
}

#[async_trait]
impl RemoteService for LoopbackRemoteService {
    #[instrument(skip_all, fields(route = %route, session_id = session.id))]
    async fn remote_process(
        &self,
        route: &Route,
        session: &SessionContext,
        message: &Message,
    ) -> Result<Vec<u8>> {
        if route.server_type != self.server_type {
            return Err(ProtocolError::RemoteError(format!(
                "no server of type {} reachable",
                route.server_type
            )));
        }
        debug!("Serving remote call locally");
        self.registry
            .invoke_remote(&route.short(), message.data.clone())
            .await
            .map_err(|e| match e {
                ProtocolError::RouteNotFound(_) | ProtocolError::Handler { .. } => e,
                other => ProtocolError::RemoteError(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::component::{Component, HandlerProvider, Methods, RegisterOptions};
    use bytes::Bytes;
    use std::sync::Arc;

    struct Ranking;

    impl Component for Ranking {}

    impl HandlerProvider for Ranking {
        fn methods(self: Arc<Self>) -> Methods {
            Methods::new()
                .remote("Top", |payload: Bytes| async move {
                    let mut out = b"top:".to_vec();
                    out.extend_from_slice(&payload);
                    Ok(out)
                })
                .remote("Broken", |_payload: Bytes| async move {
                    Err(ProtocolError::handler("RANK_DOWN", "ranking offline"))
                })
        }
    }

    fn service() -> LoopbackRemoteService {
        let mut registry = ComponentRegistry::new();
        registry.register(Arc::new(Ranking), RegisterOptions::new()).unwrap();
        LoopbackRemoteService::new("rank", registry)
    }

    #[tokio::test]
    async fn test_serves_matching_server_type() {
        let route = Route::decode("rank.Ranking.Top").unwrap();
        let message = Message::request(4, "rank.Ranking.Top", &b"10"[..]);
        let out = service()
            .remote_process(&route, &SessionContext::default(), &message)
            .await
            .unwrap();
        assert_eq!(out, b"top:10");
    }

    #[tokio::test]
    async fn test_errors_are_reported() {
        let svc = service();
        let ctx = SessionContext::default();

        let wrong = Route::decode("chat.Ranking.Top").unwrap();
        let msg = Message::notify("chat.Ranking.Top", Bytes::new());
        let err = svc.remote_process(&wrong, &ctx, &msg).await.unwrap_err();
        assert_eq!(err.code(), "REMOTE_FAILURE");

        let broken = Route::decode("rank.Ranking.Broken").unwrap();
        let err = svc.remote_process(&broken, &ctx, &msg).await.unwrap_err();
        assert_eq!(err.code(), "RANK_DOWN");

        let missing = Route::decode("rank.Ranking.Nope").unwrap();
        let err = svc.remote_process(&missing, &ctx, &msg).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
