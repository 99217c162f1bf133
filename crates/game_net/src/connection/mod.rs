//! Connections and their lifecycle.
//!
//! A [`Connection`] is created by a worker when it takes an inbound socket or
//! an outbound request off its queue, and is serviced by that worker for its
//! whole life. Application code holds shared handles to it and may write to
//! it from any thread.

mod callbacks;
mod handle;
pub(crate) mod io;
pub mod registry;

pub use callbacks::Callbacks;
pub use handle::{Connection, WeakConnection};
pub use registry::ConnectionRegistry;

/// Type alias for connection identifiers.
///
/// Ids are unique within one reactor pool for the life of the process.
pub type ConnectionId = usize;

/// Lifecycle state of a connection or connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnState {
    NotConnected = 0,
    Connecting = 1,
    Connected = 2,
    Closed = 3,
}

impl ConnState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnState::Connecting,
            2 => ConnState::Connected,
            3 => ConnState::Closed,
            _ => ConnState::NotConnected,
        }
    }
}
