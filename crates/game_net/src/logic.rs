//! Handoff from worker threads to a dedicated logic thread.
//!
//! Callbacks run on worker threads and must not block them. Services with
//! long-running handlers install a [`LogicForwarder`] as their callback set;
//! it moves every event onto a [`LogicThread`] that processes them in order
//! on its own OS thread. Each event holds a counted connection handle, so
//! the connection stays valid until the event has been handled.

use crate::connection::{Callbacks, Connection};
use crate::error::NetError;
use crate::protocol::MessageHeader;
use crossbeam::channel::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Event moved from a worker to the logic thread.
#[derive(Debug)]
pub enum LogicEvent {
    Message { conn: Connection, message: Vec<u8> },
    Connect { conn: Connection, ok: bool },
    Disconnect { conn: Connection },
}

impl LogicEvent {
    pub fn connection(&self) -> &Connection {
        match self {
            LogicEvent::Message { conn, .. }
            | LogicEvent::Connect { conn, .. }
            | LogicEvent::Disconnect { conn } => conn,
        }
    }

    /// Replays the event against a callback set on the current thread.
    pub fn deliver(self, callbacks: &dyn Callbacks) {
        match self {
            LogicEvent::Message { conn, message } => callbacks.on_message(&conn, &message),
            LogicEvent::Connect { conn, ok } => callbacks.on_connect(&conn, ok),
            LogicEvent::Disconnect { conn } => callbacks.on_disconnect(&conn),
        }
    }
}

/// Consumer of logic events.
pub trait LogicHandler: Send + 'static {
    fn handle(&mut self, event: LogicEvent);
}

impl<F> LogicHandler for F
where
    F: FnMut(LogicEvent) + Send + 'static,
{
    fn handle(&mut self, event: LogicEvent) {
        self(event)
    }
}

/// Dedicated thread draining a queue of [`LogicEvent`]s.
#[derive(Debug)]
pub struct LogicThread {
    name: String,
    sender: Option<Sender<LogicEvent>>,
    thread: Option<JoinHandle<()>>,
}

impl LogicThread {
    /// Starts the thread. Events are handled in the order they were sent.
    pub fn spawn<H: LogicHandler>(name: impl Into<String>, mut handler: H) -> Result<Self, NetError> {
        let name = name.into();
        let (sender, receiver): (Sender<LogicEvent>, Receiver<LogicEvent>) = channel::unbounded();

        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            for event in receiver.iter() {
                handler.handle(event);
            }
        })?;
        debug!("logic thread {} started", name);

        Ok(Self {
            name,
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// A callback set that forwards to this thread.
    pub fn forwarder(&self) -> LogicForwarder {
        LogicForwarder {
            name: self.name.clone(),
            sender: self.sender.clone(),
        }
    }

    /// Closes the queue and waits for queued events to be handled.
    ///
    /// Forwarders that outlive the thread keep the queue open, so they must
    /// be dropped first for this to return.
    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("logic thread {} panicked", self.name);
            }
        }
    }
}

impl Drop for LogicThread {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Callback set that hands every event to a [`LogicThread`].
///
/// Messages whose header does not parse are dropped on the worker.
#[derive(Debug, Clone)]
pub struct LogicForwarder {
    name: String,
    sender: Option<Sender<LogicEvent>>,
}

impl LogicForwarder {
    fn forward(&self, event: LogicEvent) {
        let Some(sender) = &self.sender else { return };
        if sender.send(event).is_err() {
            warn!("logic thread {} is gone; event dropped", self.name);
        }
    }
}

impl Callbacks for LogicForwarder {
    fn on_message(&self, conn: &Connection, message: &[u8]) {
        if let Err(e) = MessageHeader::parse(message) {
            error!("{}: conn {} sent malformed frame: {}", self.name, conn.id(), e);
            return;
        }
        self.forward(LogicEvent::Message {
            conn: conn.incref(),
            message: message.to_vec(),
        });
    }

    fn on_connect(&self, conn: &Connection, ok: bool) {
        self.forward(LogicEvent::Connect {
            conn: conn.incref(),
            ok,
        });
    }

    fn on_disconnect(&self, conn: &Connection) {
        self.forward(LogicEvent::Disconnect { conn: conn.incref() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_events_arrive_in_order_on_logic_thread() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let logic = LogicThread::spawn("logic-test", move |event: LogicEvent| {
            let thread = thread::current().name().map(str::to_string);
            let kind = match &event {
                LogicEvent::Connect { ok, .. } => format!("connect:{ok}"),
                LogicEvent::Message { message, .. } => format!("message:{}", message.len()),
                LogicEvent::Disconnect { .. } => "disconnect".to_string(),
            };
            tx.send((thread, kind)).unwrap();
        })
        .expect("spawn logic thread");

        let forwarder = logic.forwarder();
        let conn = Connection::detached(Arc::new(forwarder.clone()));
        forwarder.on_connect(&conn, true);
        forwarder.on_message(&conn, &frame(7, 0, b"abc").unwrap());
        forwarder.on_message(&conn, &[1, 2]);
        forwarder.on_disconnect(&conn);

        let timeout = Duration::from_secs(5);
        let received: Vec<_> = (0..3).map(|_| rx.recv_timeout(timeout).unwrap()).collect();
        for (thread, _) in &received {
            assert_eq!(thread.as_deref(), Some("logic-test"));
        }
        let kinds: Vec<_> = received.into_iter().map(|(_, kind)| kind).collect();
        assert_eq!(kinds, vec!["connect:true", "message:11", "disconnect"]);

        drop(forwarder);
        drop(conn);
        logic.stop();
    }

    #[test]
    fn test_deliver_replays_against_callbacks() {
        struct Record(crossbeam::channel::Sender<String>);

        impl Callbacks for Record {
            fn on_message(&self, _conn: &Connection, message: &[u8]) {
                self.0.send(format!("message:{}", message.len())).unwrap();
            }

            fn on_connect(&self, _conn: &Connection, ok: bool) {
                self.0.send(format!("connect:{ok}")).unwrap();
            }

            fn on_disconnect(&self, _conn: &Connection) {
                self.0.send("disconnect".to_string()).unwrap();
            }
        }

        let (tx, rx) = crossbeam::channel::unbounded();
        let record = Record(tx);
        let conn = Connection::detached(Arc::new(Record(crossbeam::channel::unbounded().0)));

        LogicEvent::Connect { conn: conn.incref(), ok: false }.deliver(&record);
        LogicEvent::Message { conn: conn.incref(), message: vec![0; 8] }.deliver(&record);
        LogicEvent::Disconnect { conn: conn.incref() }.deliver(&record);

        let seen: Vec<String> = rx.try_iter().collect();
        assert_eq!(seen, vec!["connect:false", "message:8", "disconnect"]);
        assert_eq!(conn.ref_count(), 1);
    }

    #[test]
    fn test_events_retain_connection_until_handled() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let (start_tx, start_rx) = crossbeam::channel::bounded::<()>(0);
        let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(0);
        let logic = LogicThread::spawn("logic-hold", move |event: LogicEvent| {
            start_rx.recv().ok();
            tx.send(event.connection().ref_count()).unwrap();
            release_rx.recv().ok();
        })
        .expect("spawn logic thread");

        let forwarder = logic.forwarder();
        let conn = Connection::detached(Arc::new(forwarder.clone()));
        let watch = conn.downgrade();
        forwarder.on_disconnect(&conn);
        drop(conn);
        start_tx.send(()).unwrap();

        // The queued event alone keeps the connection alive.
        let count = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(count, 1);
        assert!(watch.upgrade().is_some());

        release_tx.send(()).unwrap();
        drop(forwarder);
        logic.stop();
        assert!(watch.upgrade().is_none());
    }
}
