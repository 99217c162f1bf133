//! Reference-counted connection handle.

use super::{Callbacks, ConnState, ConnectionId};
use crate::connector::Connector;
use crate::error::NetError;
use crate::protocol::encode;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

type UserData = Arc<dyn Any + Send + Sync>;

struct ConnectionInner {
    id: ConnectionId,
    peer: String,
    worker: usize,
    state: AtomicU8,
    /// Output buffer; `None` before connect and after close.
    output: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    closing: Notify,
    disconnected: AtomicBool,
    user: Mutex<Option<UserData>>,
    callbacks: Arc<dyn Callbacks>,
    origin: Option<Weak<Connector>>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        trace!("connection {} ({}) released", self.id, self.peer);
    }
}

/// Shared handle to one TCP link.
///
/// Cloning a `Connection` takes a reference; dropping it releases one. The
/// connection's resources are freed when the last reference goes away, so a
/// handle kept by application code stays valid (though possibly `Closed`)
/// even after the worker has stopped servicing the socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// Non-owning reference to a [`Connection`].
#[derive(Clone)]
pub struct WeakConnection {
    id: ConnectionId,
    inner: Weak<ConnectionInner>,
}

impl WeakConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }

    /// True once every counted handle is gone.
    pub fn is_dead(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakConnection").field("id", &self.id).finish()
    }
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        peer: String,
        worker: usize,
        callbacks: Arc<dyn Callbacks>,
        origin: Option<Weak<Connector>>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                peer,
                worker,
                state: AtomicU8::new(ConnState::NotConnected as u8),
                output: Mutex::new(None),
                closing: Notify::new(),
                disconnected: AtomicBool::new(false),
                user: Mutex::new(None),
                callbacks,
                origin,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Peer address as text.
    pub fn peer_addr(&self) -> &str {
        &self.inner.peer
    }

    /// Index of the worker that services this connection.
    pub fn worker(&self) -> usize {
        self.inner.worker
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnState::Connected
    }

    /// Takes an additional reference.
    pub fn incref(&self) -> Connection {
        self.clone()
    }

    /// Releases this reference.
    pub fn decref(self) {
        drop(self);
    }

    /// Number of live references, the event loop's own included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn output(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Vec<u8>>>> {
        self.inner
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `bytes` to the output buffer.
    ///
    /// Safe to call from any thread. The bytes are flushed in order by the
    /// worker servicing the connection.
    pub fn write(&self, bytes: &[u8]) -> Result<(), NetError> {
        let output = self.output();
        match self.state() {
            ConnState::Connected => {}
            ConnState::Closed => return Err(NetError::Closed),
            ConnState::NotConnected | ConnState::Connecting => return Err(NetError::NotConnected),
        }
        let sender = output.as_ref().ok_or(NetError::Closed)?;
        sender.send(bytes.to_vec()).map_err(|_| NetError::Closed)
    }

    /// Encodes `body` as a frame for `command` and writes it.
    pub fn send<T: Serialize>(&self, command: u16, body: &T) -> Result<(), NetError> {
        let message = encode(command, 0, body)?;
        self.write(&message)
    }

    /// Requests that the connection be closed.
    ///
    /// Callable from any thread. Already queued output is flushed before the
    /// socket closes; later writes fail with [`NetError::Closed`].
    pub fn shutdown(&self) {
        {
            let _output = self.output();
            self.inner
                .state
                .store(ConnState::Closed as u8, Ordering::Release);
        }
        self.inner.closing.notify_one();
    }

    /// Attaches a value for the application's own bookkeeping.
    pub fn set_user_data<T: Any + Send + Sync>(&self, value: Arc<T>) {
        *self.user() = Some(value as UserData);
    }

    /// Returns the attached value if it is a `T`.
    pub fn user_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.user().clone().and_then(|data| data.downcast::<T>().ok())
    }

    pub fn clear_user_data(&self) {
        *self.user() = None;
    }

    fn user(&self) -> MutexGuard<'_, Option<UserData>> {
        self.inner.user.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn callbacks(&self) -> &Arc<dyn Callbacks> {
        &self.inner.callbacks
    }

    /// The connector this connection was created for, if it still exists.
    pub fn connector(&self) -> Option<Arc<Connector>> {
        self.inner.origin.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_state(&self, state: ConnState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Installs the output buffer and marks the connection Connected.
    pub(crate) fn attach_output(&self, sender: mpsc::UnboundedSender<Vec<u8>>) {
        let mut output = self.output();
        *output = Some(sender);
        // A shutdown requested while connecting wins.
        if self.state() != ConnState::Closed {
            self.set_state(ConnState::Connected);
        }
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been requested.
    pub(crate) async fn closing(&self) {
        self.inner.closing.notified().await
    }

    /// Tears the link down. Only the first call has any effect.
    ///
    /// Marks the connection Closed, drops the output buffer, clears the
    /// owning connector's link and finally fires `on_disconnect`.
    pub(crate) fn close(&self) {
        if self.inner.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut output = self.output();
            self.set_state(ConnState::Closed);
            output.take();
        }
        if let Some(connector) = self.connector() {
            connector.detach(self.id());
        }
        debug!("connection {} to {} closed", self.id(), self.peer_addr());
        self.inner.callbacks.on_disconnect(self);
    }

    /// Marks a failed outbound attempt and reports it with `on_connect(false)`.
    pub(crate) fn fail_connect(&self) {
        if self.inner.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_state(ConnState::Closed);
        if let Some(connector) = self.connector() {
            connector.detach(self.id());
        }
        self.inner.callbacks.on_connect(self, false);
    }
}

#[cfg(test)]
impl Connection {
    /// A Connected handle with no socket behind it.
    pub(crate) fn detached(callbacks: Arc<dyn Callbacks>) -> Self {
        Self::detached_pair(callbacks).0
    }

    /// Like [`detached`](Self::detached) but also returns the output buffer.
    pub(crate) fn detached_pair(
        callbacks: Arc<dyn Callbacks>,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let conn = Self::new(0, "detached".to_string(), 0, callbacks, None);
        let (tx, rx) = mpsc::unbounded_channel();
        conn.attach_output(tx);
        (conn, rx)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("worker", &self.inner.worker)
            .field("state", &self.state())
            .finish()
    }
}
