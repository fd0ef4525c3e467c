//! Broker layer.
//!
//! Hosting glue: one per process. Joins the [`Bridge`] (the command target
//! and inbound entity handler) with the [`RpcServer`] that exposes its
//! commands, and reacts to the host's lifecycle events.

use crate::{
    // ---
    log_debug,
    log_info,
    Bridge,
    CommandRegistry,
    ConnectionStatus,
    EntityHandler,
    InboundEntity,
    LayerEvent,
    Result,
    RpcConfig,
    RpcServer,
    StackPtr,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Bridge plus RPC server, driven by layer events.
pub struct BrokerLayer {
    bridge: Arc<Bridge>,
    server: RpcServer<Bridge>,
}

impl BrokerLayer {
    // ---

    /// Build the bridge over `stack` and a server for its commands.
    /// Nothing is bound until a [`LayerEvent::Start`] arrives.
    pub fn new(config: RpcConfig, stack: StackPtr) -> Self {
        // ---
        let bridge = Arc::new(Bridge::new(stack, config.pending_ttl));
        let server = RpcServer::new(config, CommandRegistry::build(), bridge.clone());
        Self { bridge, server }
    }

    /// Handle a lifecycle event. Returns whether the event was consumed.
    ///
    /// # Errors
    ///
    /// Propagates the server's start failure (bind error or wrong state).
    pub async fn on_event(&self, event: &LayerEvent) -> Result<bool> {
        // ---
        match event {
            LayerEvent::Start => {
                let addr = self.server.start().await?;
                log_info!("broker layer started on {addr}");
                Ok(true)
            }
            LayerEvent::Stop => {
                self.server.stop();
                log_info!("broker layer stopping");
                Ok(true)
            }
            other => {
                log_debug!("broker layer ignores {other:?}");
                Ok(false)
            }
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn server(&self) -> &RpcServer<Bridge> {
        &self.server
    }

    /// Login status as last reported by the protocol stack.
    pub fn connection(&self) -> &ConnectionStatus {
        self.bridge.connection()
    }

    /// Stop the server and wait for its worker to finish.
    pub async fn shutdown(&self) {
        // ---
        self.server.stop();
        self.server.join().await;
    }
}

#[async_trait]
impl EntityHandler for BrokerLayer {
    // ---
    async fn on_entity(&self, entity: InboundEntity) {
        self.bridge.handle_entity(entity).await;
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::stack::create_memory_stack;
    use crate::{LoginState, ServerState, SuccessEntity};

    fn layer() -> BrokerLayer {
        // ---
        let (stack, _outbox) = create_memory_stack();
        BrokerLayer::new(RpcConfig::default().with_bind_addr("127.0.0.1:0"), stack)
    }

    #[tokio::test]
    async fn test_start_and_stop_events() {
        // ---
        let layer = layer();

        assert!(layer.on_event(&LayerEvent::Start).await.unwrap());
        assert!(layer.server().local_addr().is_some());

        assert!(layer.on_event(&LayerEvent::Stop).await.unwrap());
        layer.shutdown().await;
        assert_eq!(layer.server().state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_other_events_pass_through() {
        // ---
        let layer = layer();
        assert!(!layer.on_event(&LayerEvent::Connect).await.unwrap());
        assert!(!layer.on_event(&LayerEvent::Disconnect).await.unwrap());
        assert_eq!(layer.server().state(), ServerState::Idle);
    }

    #[tokio::test]
    async fn test_entities_reach_the_bridge() {
        // ---
        let layer = layer();
        layer
            .on_entity(InboundEntity::Success(SuccessEntity { creation: None }))
            .await;
        assert_eq!(layer.connection().get(), LoginState::Connected);
    }
}
