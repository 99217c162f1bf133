//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that starts the reactor
//! pool, runs the configured service role on it, and tears everything down
//! in order when a shutdown signal arrives.

use crate::config::{AppConfig, NodeRole};
use crate::logging::display_banner;
use crate::roles::{center_role, client_role, ClientSession};
use crate::signals::wait_for_shutdown_signal;
use game_net::{
    ConnState, Connector, Listener, ListenerContext, LogicEvent, LogicThread, NetError,
    ReactorPool,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// How long shutdown waits for the logic thread to drain its queue.
const LOGIC_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Main application struct.
///
/// Owns the reactor pool for the whole life of the process. The pool is
/// started in [`Application::new`] so that a worker setup failure stops the
/// node before any service is exposed.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Worker threads shared by the service
    pool: Arc<ReactorPool>,
    /// Login state of the client role
    session: Arc<ClientSession>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Validates the configuration, displays the banner and starts the
    /// reactor pool, waiting until every worker is ready.
    ///
    /// # Returns
    ///
    /// A configured `Application` ready to run, or an error if the
    /// configuration is invalid or the workers could not be started.
    pub async fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner(config.server.role);

        let net = config.net.clone();
        let pool = tokio::task::spawn_blocking(move || ReactorPool::start(&net)).await??;

        Ok(Self {
            config,
            pool: Arc::new(pool),
            session: Arc::new(ClientSession::default()),
        })
    }

    /// Login state of the client role.
    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    /// Runs the node until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = wait_for_shutdown_signal().await {
                error!("❌ Signal handling failed, shutting down: {}", e);
            }
        })
        .await
    }

    /// Runs the node until `stop` completes, then shuts down.
    ///
    /// Shutdown order: the listener or retry task stops first, then the
    /// reactor pool joins its workers, and finally the logic thread drains
    /// what the workers handed it.
    pub async fn run_until<F>(self, stop: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        info!("🌟 Starting game node as {}", self.config.server.role);
        self.log_configuration_summary();

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut logic = None;

        let service = match self.config.server.role {
            NodeRole::Center => {
                let role = center_role()?;
                let thread = LogicThread::spawn("center-logic", move |event: LogicEvent| {
                    event.deliver(&role)
                })?;
                let context = ListenerContext::new("center", Arc::new(thread.forwarder()));
                logic = Some(thread);

                let listener = Listener::bind(self.config.bind_addr()?, context).await?;
                info!("🎮 Ready to accept connections on {}", listener.local_addr()?);

                let pool = self.pool.clone();
                let shutdown = shutdown_tx.subscribe();
                tokio::spawn(async move { listener.run(&pool, shutdown).await })
            }
            NodeRole::Client => {
                let role = client_role(self.config.server.client_uid, self.session.clone())?;
                let connector =
                    Connector::create(&self.pool, self.config.upstream_addr()?, Arc::new(role))?;
                connector.set_retry_interval(self.config.reconnect_interval());

                tokio::spawn(keep_connected(
                    self.pool.clone(),
                    connector,
                    shutdown_tx.subscribe(),
                ))
            }
        };

        info!("✅ Game node is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        stop.await;
        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        info!("📡 Phase 1: Stopping the service task...");
        let _ = shutdown_tx.send(());
        if let Err(e) = service.await {
            error!("❌ Service task failed: {}", e);
        }

        info!("🧹 Phase 2: Stopping network workers...");
        let pool = self.pool;
        tokio::task::spawn_blocking(move || {
            pool.shutdown();
            drop(pool);
        })
        .await?;

        if let Some(logic) = logic {
            info!("⏳ Phase 3: Draining the logic thread...");
            let stopping = tokio::task::spawn_blocking(move || logic.stop());
            match tokio::time::timeout(LOGIC_DRAIN_TIMEOUT, stopping).await {
                Ok(Ok(())) => info!("✅ Logic thread drained"),
                Ok(Err(e)) => error!("❌ Logic thread shutdown failed: {}", e),
                Err(_) => warn!("⏰ Logic thread did not drain within timeout"),
            }
        }

        info!("✅ Game node shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🎭 Role: {}", self.config.server.role);
        match self.config.server.role {
            NodeRole::Center => info!("  🌐 Bind address: {}", self.config.server.bind_address),
            NodeRole::Client => {
                info!("  🌐 Upstream address: {}", self.config.server.upstream_address);
                info!("  🔄 Reconnect interval: {}ms", self.config.server.reconnect_interval_ms);
            }
        }
        info!("  🧵 Workers: {}", self.pool.worker_count());
        info!("  📦 Max message size: {} bytes", self.config.net.max_message_size);
    }
}

/// Resubmits the connector whenever its link is down.
///
/// Runs until `shutdown` fires. Without a retry interval the first attempt
/// is the only one.
async fn keep_connected(
    pool: Arc<ReactorPool>,
    connector: Arc<Connector>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let Some(period) = connector.retry_interval() else {
        let _ = shutdown.recv().await;
        return;
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connector.state() != ConnState::NotConnected {
                    continue;
                }
                match connector.reconnect(&pool) {
                    Ok(worker) => info!("🔄 Retrying {} on worker {}", connector.addr_text(), worker),
                    Err(NetError::AlreadyConnected) => {}
                    Err(e) => {
                        error!("❌ Retry to {} failed: {}", connector.addr_text(), e);
                        break;
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
