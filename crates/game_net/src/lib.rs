//! # Game Net - Connection Engine
//!
//! The transport layer shared by every service of the game backend (login,
//! center, gate and client roles). It owns sockets on a pool of event-loop
//! worker threads, hands new links to those workers, and routes framed
//! command messages to per-role handler tables.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Reactor Pool** - N worker threads, each running its own event loop
//! * **Queue & Freelist** - Cross-thread work queue with recycled items and
//!   a one-signal-per-item wakeup
//! * **Connection** - Reference-counted handle to one TCP link, serviced
//!   exclusively by the worker that created it
//! * **Connector** - Caller-owned descriptor of an outbound link
//! * **Command Protocol** - 8-byte header, range-checked command tables
//!
//! ### Message Flow
//!
//! 1. A [`Listener`] accepts a socket, or a [`Connector`] requests a link
//! 2. The pool pushes a queue item onto the next worker (round-robin) and
//!    wakes it
//! 3. The worker pops the item, creates the [`Connection`] and calls
//!    `on_connect`
//! 4. Every complete frame is passed to `on_message`; a [`Role`] range-checks
//!    the command and invokes the registered handler
//! 5. When the link goes down `on_disconnect` fires exactly once
//!
//! ## Example
//!
//! ```rust,no_run
//! use game_net::protocol::{CommandRange, Role, ViolationPolicy};
//! use game_net::{Listener, ListenerContext, NetConfig, ReactorPool};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ReactorPool::start(&NetConfig::with_workers(4))?;
//!
//! let role = Role::builder("login", CommandRange::new(100, 200)?)
//!     .policy(ViolationPolicy::DropMessage)
//!     .on(101, |conn, message| {
//!         let _ = conn.write(message);
//!     })
//!     .build()?;
//!
//! let listener = Listener::bind("0.0.0.0:7000", ListenerContext::new("login", Arc::new(role))).await?;
//! let (_stop, shutdown) = tokio::sync::broadcast::channel(1);
//! listener.run(&pool, shutdown).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! * [`Connection::write`] and [`Connector::write`] may be called from any
//!   thread; bytes are flushed in order by the owning worker
//! * Callbacks run on worker threads; long-running work belongs on a
//!   [`LogicThread`]
//! * The freelist and each worker queue are guarded by their own locks

// Re-export core types for easy access
pub use config::NetConfig;
pub use connection::{Callbacks, ConnState, Connection, ConnectionId, WeakConnection};
pub use connector::Connector;
pub use error::{NetError, ProtocolError, Result};
pub use listener::{Listener, ListenerContext};
pub use logic::{LogicEvent, LogicForwarder, LogicHandler, LogicThread};
pub use protocol::{CommandRange, Role, ViolationPolicy};
pub use reactor::ReactorPool;

// Public module declarations
pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod listener;
pub mod logic;
pub mod protocol;
pub mod queue;
pub mod reactor;
