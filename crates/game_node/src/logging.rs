//! Logging system setup and configuration.
//!
//! This module installs the `tracing-subscriber` registry with either a
//! human-readable or a JSON formatter. Thread names are always included so
//! that the owning network worker (`net-worker-{i}`) is visible on every
//! connection event.

use crate::config::{LoggingSettings, NodeRole};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builds the level filter, preferring `RUST_LOG` when it is set.
fn build_filter(config: &LoggingSettings) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.level)?),
    }
}

/// Initializes the logging system with the specified configuration.
///
/// # Arguments
///
/// * `config` - Logging configuration after CLI overrides
///
/// # Returns
///
/// `Ok(())` if logging was set up successfully, or an error if the level is
/// invalid or a global subscriber is already installed.
pub fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let registry = tracing_subscriber::registry().with(build_filter(config)?);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}

/// Displays the startup banner using proper logging.
pub fn display_banner(role: NodeRole) {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║              🌟 GAME NODE 🌟             ║");
    info!("║  version {:<32}║", version);
    info!("║  role    {:<32}║", role.to_string());
    info!("╚══════════════════════════════════════════╝");
}
