//! Connection roles built from a command table and lifecycle hooks.
//!
//! A [`Role`] is the unit an application installs on a listener or a
//! connector: it owns one [`CommandTable`] plus optional connect and
//! disconnect hooks, and implements [`Callbacks`] so the engine can drive it
//! directly from a worker thread.
//!
//! ```rust
//! use game_net::protocol::{CommandRange, Role, ViolationPolicy};
//!
//! let role = Role::builder("server", CommandRange::new(1000, 1100).unwrap())
//!     .policy(ViolationPolicy::DropConnection)
//!     .on(1001, |conn, _message| {
//!         tracing::info!("reply on {}", conn.id());
//!     })
//!     .build()
//!     .expect("role should build");
//! assert_eq!(role.name(), "server");
//! ```

use super::codec::decode_body;
use super::dispatch::{CommandRange, CommandTable, DispatchOutcome, Handler, ViolationPolicy};
use crate::connection::{Callbacks, Connection};
use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::error;

type ConnectHook = Box<dyn Fn(&Connection, bool) + Send + Sync>;
type DisconnectHook = Box<dyn Fn(&Connection) + Send + Sync>;

/// Command table plus lifecycle hooks for one kind of peer.
pub struct Role {
    table: CommandTable,
    on_connect: Option<ConnectHook>,
    on_disconnect: Option<DisconnectHook>,
}

impl Role {
    pub fn builder(name: impl Into<String>, range: CommandRange) -> RoleBuilder {
        RoleBuilder {
            name: name.into(),
            range,
            policy: ViolationPolicy::default(),
            handlers: Vec::new(),
            on_connect: None,
            on_disconnect: None,
        }
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Dispatches one frame through the role's table.
    pub fn dispatch(&self, conn: &Connection, message: &[u8]) -> DispatchOutcome {
        self.table.dispatch(conn, message)
    }
}

impl Callbacks for Role {
    fn on_message(&self, conn: &Connection, message: &[u8]) {
        self.table.dispatch(conn, message);
    }

    fn on_connect(&self, conn: &Connection, ok: bool) {
        if let Some(hook) = &self.on_connect {
            hook(conn, ok);
        }
    }

    fn on_disconnect(&self, conn: &Connection) {
        if let Some(hook) = &self.on_disconnect {
            hook(conn);
        }
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Role").field("table", &self.table).finish()
    }
}

/// Builder for [`Role`].
pub struct RoleBuilder {
    name: String,
    range: CommandRange,
    policy: ViolationPolicy,
    handlers: Vec<(u16, Handler)>,
    on_connect: Option<ConnectHook>,
    on_disconnect: Option<DisconnectHook>,
}

impl RoleBuilder {
    pub fn policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers a handler that receives the raw frame.
    pub fn on<F>(mut self, command: u16, handler: F) -> Self
    where
        F: Fn(&Connection, &[u8]) + Send + Sync + 'static,
    {
        self.handlers.push((command, Box::new(handler)));
        self
    }

    /// Registers a handler that receives the decoded JSON payload.
    ///
    /// A payload that fails to decode is logged and dropped; the connection
    /// stays open.
    pub fn on_typed<T, F>(mut self, command: u16, handler: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(&Connection, T) + Send + Sync + 'static,
    {
        let role = self.name.clone();
        self.handlers.push((
            command,
            Box::new(move |conn: &Connection, message: &[u8]| {
                match decode_body::<T>(message) {
                    Ok(body) => handler(conn, body),
                    Err(e) => error!("{}: cmd {} from conn {}: {}", role, command, conn.id(), e),
                }
            }),
        ));
        self
    }

    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Connection, bool) + Send + Sync + 'static,
    {
        self.on_connect = Some(Box::new(hook));
        self
    }

    pub fn on_disconnect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Box::new(hook));
        self
    }

    /// Builds the role, failing if any handler was registered outside the
    /// range.
    pub fn build(self) -> Result<Role, ProtocolError> {
        let mut table = CommandTable::new(self.name, self.range, self.policy);
        for (command, handler) in self.handlers {
            table.register(command, handler)?;
        }
        Ok(Role {
            table,
            on_connect: self.on_connect,
            on_disconnect: self.on_disconnect,
        })
    }
}
