//! Thread-pool reactor.
//!
//! A [`ReactorPool`] runs a fixed number of worker threads, each with its own
//! event loop. New links are handed to a worker by pushing an item onto its
//! queue and sending it one [`Wakeup::Item`]; the worker then owns the
//! resulting connection for its whole life.

mod pool;
mod worker;

pub use pool::ReactorPool;

use crate::connector::Connector;
use crate::listener::ListenerContext;
use std::sync::Arc;

/// Work carried by a queue item.
pub(crate) enum Work {
    /// An accepted socket plus the context of the listener that accepted it.
    Inbound {
        socket: std::net::TcpStream,
        listener: Arc<ListenerContext>,
    },
    /// A connect attempt for a connector.
    Outbound { connector: Arc<Connector> },
}

/// Signal sent to a worker's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wakeup {
    /// One item was pushed onto the worker's queue.
    Item,
    /// Leave the event loop.
    Shutdown,
}
