//! Outbound link descriptors.
//!
//! A [`Connector`] describes one actively initiated link to a remote
//! service. Creating it submits a connect attempt to the reactor pool; the
//! worker that takes the attempt creates the [`Connection`] and reports back
//! through the connector's callbacks.
//!
//! The connector never owns its connection. It keeps a weak link that is set
//! when an attempt starts and cleared when the connection goes down, so a
//! stale link can never be written through.
//!
//! Submitting an attempt moves the connector from NotConnected to Connecting
//! before the attempt is queued, so at most one attempt is live at a time.
//! A link whose connection was dropped without closing (the pool shut down
//! under it) reads as NotConnected again.
//!
//! Reconnecting is up to the caller: [`Connector::retry_interval`] stores the
//! caller's policy but nothing in the engine acts on it.

use crate::connection::{Callbacks, ConnState, Connection, ConnectionId, WeakConnection};
use crate::error::NetError;
use crate::reactor::ReactorPool;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
struct Link {
    state: ConnState,
    conn: Option<WeakConnection>,
}

/// Caller-owned descriptor of an outbound link.
pub struct Connector {
    target: SocketAddr,
    addr_text: String,
    link: Mutex<Link>,
    retry_interval: Mutex<Option<Duration>>,
    callbacks: Arc<dyn Callbacks>,
}

impl Connector {
    /// Creates a connector that has not been submitted yet.
    pub fn new(target: SocketAddr, callbacks: Arc<dyn Callbacks>) -> Arc<Self> {
        Arc::new(Self {
            target,
            addr_text: target.to_string(),
            link: Mutex::new(Link {
                state: ConnState::NotConnected,
                conn: None,
            }),
            retry_interval: Mutex::new(None),
            callbacks,
        })
    }

    /// Creates a connector and submits its first connect attempt.
    ///
    /// Returns as soon as the attempt is queued; the outcome arrives through
    /// `on_connect`.
    pub fn create(
        pool: &ReactorPool,
        target: SocketAddr,
        callbacks: Arc<dyn Callbacks>,
    ) -> Result<Arc<Self>, NetError> {
        let connector = Self::new(target, callbacks);
        let worker = pool.dispatch_outbound(connector.clone())?;
        info!("🔌 Connector to {} queued on worker {}", connector.addr_text, worker);
        Ok(connector)
    }

    /// Submits a new connect attempt.
    ///
    /// # Errors
    ///
    /// [`NetError::AlreadyConnected`] unless the connector is NotConnected,
    /// including while an earlier attempt is still queued.
    pub fn reconnect(self: &Arc<Self>, pool: &ReactorPool) -> Result<usize, NetError> {
        debug!("reconnecting to {}", self.addr_text);
        pool.dispatch_outbound(self.clone())
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Target address as text.
    pub fn addr_text(&self) -> &str {
        &self.addr_text
    }

    pub fn state(&self) -> ConnState {
        self.link().state
    }

    /// Returns a new reference to the current connection, if there is one.
    pub fn connection(&self) -> Option<Connection> {
        self.link().conn.as_ref().and_then(WeakConnection::upgrade)
    }

    /// Writes through the current connection.
    ///
    /// Fails with [`NetError::NotConnected`] unless the connector is
    /// Connected. Nothing is queued on failure.
    pub fn write(&self, bytes: &[u8]) -> Result<(), NetError> {
        let link = self.link();
        if link.state != ConnState::Connected {
            return Err(NetError::NotConnected);
        }
        let conn = link
            .conn
            .as_ref()
            .and_then(WeakConnection::upgrade)
            .ok_or(NetError::NotConnected)?;
        conn.write(bytes)
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        *self
            .retry_interval
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_retry_interval(&self, interval: Option<Duration>) {
        *self
            .retry_interval
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = interval;
    }

    pub(crate) fn callbacks(&self) -> &Arc<dyn Callbacks> {
        &self.callbacks
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if link.conn.as_ref().is_some_and(WeakConnection::is_dead) {
            link.state = ConnState::NotConnected;
            link.conn = None;
        }
        link
    }

    /// Moves NotConnected to Connecting ahead of queueing an attempt.
    pub(crate) fn claim(&self) -> Result<(), NetError> {
        let mut link = self.link();
        if link.state != ConnState::NotConnected {
            return Err(NetError::AlreadyConnected);
        }
        link.state = ConnState::Connecting;
        link.conn = None;
        Ok(())
    }

    /// Returns a claim whose attempt never reached a worker.
    pub(crate) fn abandon(&self) {
        let mut link = self.link();
        if link.state == ConnState::Connecting && link.conn.is_none() {
            link.state = ConnState::NotConnected;
        }
    }

    /// Attaches `conn` as the attempt in flight.
    pub(crate) fn begin_connect(&self, conn: &Connection) {
        let mut link = self.link();
        link.state = ConnState::Connecting;
        link.conn = Some(conn.downgrade());
    }

    /// Marks the attempt `id` as established.
    pub(crate) fn mark_connected(&self, id: ConnectionId) {
        let mut link = self.link();
        if link.conn.as_ref().map(WeakConnection::id) == Some(id) {
            link.state = ConnState::Connected;
        }
    }

    /// Clears the link if it still points at connection `id`.
    pub(crate) fn detach(&self, id: ConnectionId) {
        let mut link = self.link();
        if link.conn.as_ref().map(WeakConnection::id) == Some(id) {
            link.state = ConnState::NotConnected;
            link.conn = None;
        }
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("target", &self.addr_text)
            .field("link", &*self.link())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Silent;

    impl Callbacks for Silent {
        fn on_message(&self, _conn: &Connection, _message: &[u8]) {}
    }

    fn connector() -> Arc<Connector> {
        Connector::new("127.0.0.1:9".parse().unwrap(), Arc::new(Silent))
    }

    fn attempt(connector: &Arc<Connector>, id: ConnectionId) -> Connection {
        let conn = Connection::new(
            id,
            connector.addr_text().to_string(),
            0,
            connector.callbacks().clone(),
            Some(Arc::downgrade(connector)),
        );
        conn.set_state(ConnState::Connecting);
        connector.begin_connect(&conn);
        conn
    }

    #[test]
    fn test_write_fails_until_connected() {
        let connector = connector();
        assert_eq!(connector.state(), ConnState::NotConnected);
        assert!(matches!(connector.write(b"ping"), Err(NetError::NotConnected)));

        let conn = attempt(&connector, 1);
        assert_eq!(connector.state(), ConnState::Connecting);
        assert!(matches!(connector.write(b"ping"), Err(NetError::NotConnected)));

        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.attach_output(tx);
        connector.mark_connected(conn.id());
        assert_eq!(connector.state(), ConnState::Connected);

        connector.write(b"ping").expect("connected write");
        assert_eq!(rx.try_recv().unwrap(), b"ping");
    }

    #[test]
    fn test_close_clears_link() {
        let connector = connector();
        let conn = attempt(&connector, 1);
        let (tx, _rx) = mpsc::unbounded_channel();
        conn.attach_output(tx);
        connector.mark_connected(conn.id());

        conn.close();
        assert_eq!(connector.state(), ConnState::NotConnected);
        assert!(connector.connection().is_none());
        assert!(matches!(connector.write(b"ping"), Err(NetError::NotConnected)));
    }

    #[test]
    fn test_stale_attempt_does_not_touch_new_link() {
        let connector = connector();
        let old = attempt(&connector, 1);
        old.fail_connect();
        assert_eq!(connector.state(), ConnState::NotConnected);

        let fresh = attempt(&connector, 2);
        // A late teardown of the old attempt leaves the fresh one alone.
        connector.detach(old.id());
        connector.mark_connected(old.id());
        assert_eq!(connector.state(), ConnState::Connecting);
        assert_eq!(connector.connection().map(|c| c.id()), Some(fresh.id()));
    }

    #[test]
    fn test_connector_does_not_own_connection() {
        let connector = connector();
        let conn = attempt(&connector, 1);
        assert_eq!(conn.ref_count(), 1);
        drop(conn);
        assert!(connector.connection().is_none());
    }

    #[test]
    fn test_claim_admits_one_attempt() {
        let connector = connector();
        connector.claim().expect("first claim");
        assert_eq!(connector.state(), ConnState::Connecting);
        assert!(matches!(connector.claim(), Err(NetError::AlreadyConnected)));

        connector.abandon();
        assert_eq!(connector.state(), ConnState::NotConnected);
        connector.claim().expect("claim after abandon");

        // Once a worker has attached the attempt, abandoning is a no-op.
        let conn = attempt(&connector, 1);
        connector.abandon();
        assert_eq!(connector.state(), ConnState::Connecting);
        drop(conn);
    }

    #[test]
    fn test_dropped_connection_reads_as_not_connected() {
        let connector = connector();
        let conn = attempt(&connector, 1);
        let (tx, _rx) = mpsc::unbounded_channel();
        conn.attach_output(tx);
        connector.mark_connected(conn.id());
        assert_eq!(connector.state(), ConnState::Connected);

        // Dropped without close, as when the pool shuts down.
        drop(conn);
        assert_eq!(connector.state(), ConnState::NotConnected);
        connector.claim().expect("claim after the link died");
    }

    #[test]
    fn test_retry_interval_is_stored_only() {
        let connector = connector();
        assert_eq!(connector.retry_interval(), None);
        connector.set_retry_interval(Some(Duration::from_secs(5)));
        assert_eq!(connector.retry_interval(), Some(Duration::from_secs(5)));
        assert_eq!(connector.state(), ConnState::NotConnected);
    }
}
