//! Engine configuration types and defaults.
//!
//! This module contains the reactor pool configuration structure and default
//! values used to size worker threads, the queue item freelist, and the frame
//! limit enforced on every connection.

use crate::error::NetError;
use crate::protocol::HEADER_LEN;
use serde::{Deserialize, Serialize};

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_items_per_alloc() -> usize {
    16
}

fn default_thread_name_prefix() -> String {
    "net-worker".to_string()
}

/// Configuration structure for the reactor pool.
///
/// Every field has a serde default so a partial `[net]` table in a TOML file
/// is enough to configure the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetConfig {
    /// Number of worker threads, each running its own event loop
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Largest accepted frame in bytes, header included
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Number of queue items allocated at once when the freelist runs dry
    #[serde(default = "default_items_per_alloc")]
    pub items_per_alloc: usize,

    /// Worker threads are named `{prefix}-{index}`
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

impl NetConfig {
    /// Creates a configuration with `workers` threads and defaults elsewhere.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), NetError> {
        if self.workers == 0 {
            return Err(NetError::Config("workers must be at least 1".into()));
        }
        if self.items_per_alloc == 0 {
            return Err(NetError::Config("items_per_alloc must be at least 1".into()));
        }
        if self.max_message_size < HEADER_LEN {
            return Err(NetError::Config(format!(
                "max_message_size must be at least the {HEADER_LEN} byte header"
            )));
        }
        Ok(())
    }

    /// Largest payload a peer may declare in a header.
    pub fn max_payload(&self) -> usize {
        self.max_message_size.saturating_sub(HEADER_LEN)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_message_size: default_max_message_size(),
            items_per_alloc: default_items_per_alloc(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}
