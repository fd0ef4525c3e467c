//! RPC server.
//!
//! Owns one bound TCP endpoint and serves one request at a time: a request
//! is decoded, routed through the [`CommandRegistry`], its pending result is
//! awaited with a bound, and exactly one response is written before the next
//! request is read. Requests and responses are single-line JSON documents.
//!
//! The worker runs on its own tokio task. Stopping is cooperative: the stop
//! signal is only observed while the worker waits for the next request or the
//! next connection, never in the middle of a dispatch.

mod worker;

use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    CommandRegistry,
    RpcConfig,
    RpcError,
    RpcRequest,
    RpcResponse,
    Result,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, endpoint not bound yet.
    Idle,
    AwaitingRequest,
    Dispatching,
    /// Waiting on the command's pending result.
    AwaitingResult,
    RepliedSuccess,
    RepliedFailure,
    /// Terminal; the endpoint has been released.
    Stopped,
}

/// Single-endpoint request/reply server for the commands of `T`.
///
/// Cloning is cheap and every clone controls the same worker.
pub struct RpcServer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RpcServer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T> {
    config: RpcConfig,
    registry: CommandRegistry<T>,
    target: Arc<T>,
    state: Mutex<ServerState>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<T> Inner<T> {
    // ---

    fn state(&self) -> ServerState {
        *lock_ignore_poison(&self.state)
    }

    fn set_state(&self, state: ServerState) {
        *lock_ignore_poison(&self.state) = state;
    }

    /// Decode, route, wait and build the response for one payload.
    ///
    /// Every failure is folded into a failure response. `tracked` moves the
    /// worker state along; transport-free callers leave it alone.
    async fn process(&self, payload: &[u8], tracked: bool) -> RpcResponse {
        // ---
        if tracked {
            self.set_state(ServerState::Dispatching);
        }

        let request = match RpcRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                log_warn!("rejecting request: {e}");
                return RpcResponse::failure();
            }
        };

        let Some(command) = self.registry.lookup(request.cmd()) else {
            log_warn!("{}", RpcError::HandlerNotFound(request.cmd().to_string()));
            return RpcResponse::failure();
        };

        let args = command.bind_args(request.fields());
        log_debug!("dispatching {} with {args:?}", command.name());

        let Some(pending) = command.invoke(self.target.clone(), args).await else {
            log_warn!("{}: command produced no result", command.name());
            return RpcResponse::failure();
        };

        if tracked {
            self.set_state(ServerState::AwaitingResult);
        }

        match pending.wait(self.config.result_timeout).await {
            Ok(output) => RpcResponse::success(output.extract()),
            Err(e) => {
                log_warn!("{}: {e}", command.name());
                RpcResponse::failure()
            }
        }
    }
}

impl<T> RpcServer<T>
where
    T: Send + Sync + 'static,
{
    // ---

    /// Create a server for `target`'s commands. Nothing is bound until
    /// [`start`](Self::start).
    pub fn new(config: RpcConfig, registry: CommandRegistry<T>, target: Arc<T>) -> Self {
        // ---
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                target,
                state: Mutex::new(ServerState::Idle),
                shutdown,
                worker: Mutex::new(None),
                local_addr: Mutex::new(None),
            }),
        }
    }

    /// Bind the configured endpoint and spawn the worker.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested.
    ///
    /// # Errors
    ///
    /// - [`RpcError::InvalidState`] unless the server is idle
    /// - [`RpcError::Bind`] if the endpoint cannot be bound
    pub async fn start(&self) -> Result<SocketAddr> {
        // ---
        self.expect_idle()?;

        let addr = self.inner.config.bind_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RpcError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        {
            let mut state = lock_ignore_poison(&self.inner.state);
            if *state != ServerState::Idle {
                return Err(RpcError::InvalidState(format!(
                    "server became {state:?} while binding"
                )));
            }
            *state = ServerState::AwaitingRequest;
        }

        *lock_ignore_poison(&self.inner.local_addr) = Some(local_addr);

        let handle = tokio::spawn(worker::serve(self.inner.clone(), listener));
        *lock_ignore_poison(&self.inner.worker) = Some(handle);

        log_info!(
            "rpc server listening on {local_addr} ({} commands)",
            self.inner.registry.len()
        );
        Ok(local_addr)
    }

    fn expect_idle(&self) -> Result<()> {
        // ---
        match self.inner.state() {
            ServerState::Idle => Ok(()),
            other => Err(RpcError::InvalidState(format!(
                "start() requires Idle, server is {other:?}"
            ))),
        }
    }

    /// Raise the stop signal.
    ///
    /// The worker finishes the request in flight, if any, then releases the
    /// endpoint. A server that was never started goes straight to
    /// [`ServerState::Stopped`].
    pub fn stop(&self) {
        // ---
        self.inner.shutdown.send_replace(true);

        let mut state = lock_ignore_poison(&self.inner.state);
        if *state == ServerState::Idle {
            *state = ServerState::Stopped;
        }
        log_debug!("rpc server stop requested");
    }

    /// Wait for the worker task to finish. Returns immediately if no worker
    /// is running.
    pub async fn join(&self) {
        // ---
        let handle = lock_ignore_poison(&self.inner.worker).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log_error!("rpc server worker failed: {e}");
                self.inner.set_state(ServerState::Stopped);
            }
        }
    }

    pub fn state(&self) -> ServerState {
        self.inner.state()
    }

    /// Bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock_ignore_poison(&self.inner.local_addr)
    }

    /// Run one payload through decode, routing, bounded wait and response
    /// construction without touching the network.
    pub async fn dispatch(&self, payload: &[u8]) -> RpcResponse {
        self.inner.process(payload, false).await
    }

    pub fn registry(&self) -> &CommandRegistry<T> {
        &self.inner.registry
    }

    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }
}
