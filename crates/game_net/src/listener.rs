//! Accepting side of the engine.
//!
//! A [`Listener`] runs its accept loop on the caller's tokio runtime and
//! hands every accepted socket to the reactor pool, which picks the worker
//! that will own the connection.

use crate::connection::Callbacks;
use crate::error::NetError;
use crate::reactor::ReactorPool;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::broadcast;
use tracing::{error, info};

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Role name and callbacks shared by every connection a listener accepts.
pub struct ListenerContext {
    name: String,
    callbacks: Arc<dyn Callbacks>,
}

impl ListenerContext {
    pub fn new(name: impl Into<String>, callbacks: Arc<dyn Callbacks>) -> Self {
        Self {
            name: name.into(),
            callbacks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callbacks(&self) -> &Arc<dyn Callbacks> {
        &self.callbacks
    }
}

impl fmt::Debug for ListenerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerContext")
            .field("name", &self.name)
            .finish()
    }
}

/// Bound TCP listener feeding a [`ReactorPool`].
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    context: Arc<ListenerContext>,
}

impl Listener {
    /// Binds to `addr` on the current tokio runtime.
    pub async fn bind(addr: impl ToSocketAddrs, context: ListenerContext) -> Result<Self, NetError> {
        let inner = TcpListener::bind(addr).await?;
        info!(
            "🌐 {} listening on {}",
            context.name(),
            inner.local_addr()?
        );
        Ok(Self {
            inner,
            context: Arc::new(context),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.inner.local_addr()?)
    }

    pub fn context(&self) -> &Arc<ListenerContext> {
        &self.context
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// Accept and dispatch failures are logged and the loop keeps going. After
    /// an accept error the loop pauses for [`ACCEPT_ERROR_BACKOFF`].
    pub async fn run(&self, pool: &ReactorPool, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let socket = match stream.into_std() {
                            Ok(socket) => socket,
                            Err(e) => {
                                error!("{}: could not detach socket from {}: {}", self.context.name(), addr, e);
                                continue;
                            }
                        };
                        if let Err(e) = pool.dispatch_inbound(socket, self.context.clone()) {
                            error!("{}: dispatch of {} failed: {}", self.context.name(), addr, e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        if pause_after_error(&mut shutdown).await {
                            info!("{}: listener stopping", self.context.name());
                            break;
                        }
                    }
                },
                _ = shutdown.recv() => {
                    info!("{}: listener stopping", self.context.name());
                    break;
                }
            }
        }
    }
}

/// Waits out [`ACCEPT_ERROR_BACKOFF`]. Returns true if shutdown fired first.
async fn pause_after_error(shutdown: &mut broadcast::Receiver<()>) -> bool {
    // Persistent errors such as fd exhaustion would otherwise spin.
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => false,
        _ = shutdown.recv() => true,
    }
}
