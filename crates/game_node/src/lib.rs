//! # Game Node - Main Entry Point
//!
//! A backend service process built on the `game_net` connection engine. The
//! same binary runs either side of a link: the `center` role accepts login
//! server connections and handles them on a dedicated logic thread, the
//! `client` role connects upstream, logs in and retries when the link drops.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (center role)
//! game_node
//!
//! # Connect to a running center
//! game_node --role client --upstream 127.0.0.1:7100
//!
//! # Override specific settings
//! game_node --bind 0.0.0.0:7100 --workers 4 --log-level debug
//! ```
//!
//! ## Configuration
//!
//! The node loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//! Command-line flags override the file.
//!
//! ## Signal Handling
//!
//! The node shuts down on SIGINT (Ctrl+C) and SIGTERM (Unix systems).

use tracing::error;

mod app;
pub mod cli;
pub mod config;
mod logging;
pub mod roles;
mod signals;

pub use app::Application;
use cli::CliArgs;
pub use config::{AppConfig, LoggingSettings, NodeRole, ServerSettings};

/// Main entry point for the game node.
///
/// Handles the complete application lifecycle:
/// 1. Command-line argument parsing
/// 2. Configuration loading and CLI overrides
/// 3. Logging system initialization
/// 4. Application creation and execution
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
///
/// Called from an async context (main with #[tokio::main]).
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "❌ Failed to load configuration from {}: {e}",
                args.config_path.display()
            );
            std::process::exit(1);
        }
    };
    args.apply_overrides(&mut config);

    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(config).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_net::{Connector, Listener, ListenerContext, NetConfig, ReactorPool};
    use roles::{center_role, client_role, ClientSession};
    use std::net::TcpListener as StdTcpListener;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::sync::{broadcast, oneshot};

    fn unused_addr() -> String {
        let spare = StdTcpListener::bind("127.0.0.1:0").unwrap();
        spare.local_addr().unwrap().to_string()
    }

    async fn wait_for_login(session: &ClientSession, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if session.is_logged_in() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        session.is_logged_in()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_client_logs_in_to_center() {
        let pool = ReactorPool::start(&NetConfig::with_workers(2)).expect("pool should start");
        let pool = Arc::new(pool);

        let context = ListenerContext::new("center", Arc::new(center_role().unwrap()));
        let listener = Listener::bind("127.0.0.1:0", context).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let accept_pool = pool.clone();
        let accept = tokio::spawn(async move { listener.run(&accept_pool, shutdown_rx).await });

        let session = Arc::new(ClientSession::default());
        let role = client_role(42, session.clone()).unwrap();
        let connector = Connector::create(&pool, addr, Arc::new(role)).unwrap();

        assert!(wait_for_login(&session, Duration::from_secs(5)).await);
        assert_eq!(session.session_key(), Some(1));
        assert!(connector.connection().is_some());

        shutdown_tx.send(()).unwrap();
        accept.await.unwrap();
        drop(connector);
        tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_applications_run_and_shut_down() {
        let addr = unused_addr();

        let mut center_config = AppConfig::default();
        center_config.server.bind_address = addr.clone();
        center_config.net.workers = 1;
        let center = Application::new(center_config).await.expect("center starts");
        let (stop_center, center_stopped) = oneshot::channel::<()>();
        let center = tokio::spawn(async move {
            center
                .run_until(async move {
                    let _ = center_stopped.await;
                })
                .await
                .map_err(|e| e.to_string())
        });

        let mut client_config = AppConfig::default();
        client_config.server.role = NodeRole::Client;
        client_config.server.upstream_address = addr;
        client_config.server.reconnect_interval_ms = 50;
        client_config.net.workers = 1;
        let client = Application::new(client_config).await.expect("client starts");
        let session = client.session().clone();

        // The center may still be binding; the retry task covers that.
        let (report, logged_in) = oneshot::channel();
        client
            .run_until(async move {
                let _ = report.send(wait_for_login(&session, Duration::from_secs(5)).await);
            })
            .await
            .expect("client shuts down cleanly");
        assert_eq!(logged_in.await, Ok(true));

        stop_center.send(()).unwrap();
        center
            .await
            .unwrap()
            .expect("center shuts down cleanly");
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.net.workers = 0;
        assert!(Application::new(config).await.is_err());
    }
}
