//! One worker thread and its event loop.
//!
//! Each worker owns a single-threaded tokio runtime driving a `LocalSet`.
//! Every socket the worker opens is serviced by a task spawned on that set,
//! so all I/O for a connection stays on its owning thread.

use super::{Wakeup, Work};
use crate::connection::{io, ConnState, Connection, ConnectionRegistry};
use crate::connector::Connector;
use crate::listener::ListenerContext;
use crate::queue::{ItemPool, WorkQueue};
use crossbeam::channel::Sender;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::net::TcpStream;
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, error, info, trace, warn};

/// Everything a worker shares with the pool.
pub(crate) struct WorkerContext {
    pub(crate) index: usize,
    pub(crate) queue: Arc<WorkQueue<Work>>,
    pub(crate) items: Arc<ItemPool<Work>>,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) ready: Arc<AtomicUsize>,
    pub(crate) max_payload: usize,
}

/// Readiness report sent once by every worker during startup.
pub(crate) type ReadyReport = Result<usize, String>;

/// Spawns the OS thread for one worker.
pub(crate) fn spawn(
    name: String,
    ctx: WorkerContext,
    wakeups: mpsc::UnboundedReceiver<Wakeup>,
    ready: Sender<ReadyReport>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name)
        .spawn(move || run(ctx, wakeups, ready))
}

fn run(ctx: WorkerContext, mut wakeups: mpsc::UnboundedReceiver<Wakeup>, ready: Sender<ReadyReport>) {
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("worker {}: event loop creation failed: {}", ctx.index, e);
            let _ = ready.send(Err(format!("worker {}: {}", ctx.index, e)));
            return;
        }
    };

    let local = LocalSet::new();
    ctx.ready.fetch_add(1, Ordering::AcqRel);
    let _ = ready.send(Ok(ctx.index));
    drop(ready);
    debug!("worker {} ready", ctx.index);

    local.block_on(&runtime, async {
        while let Some(wakeup) = wakeups.recv().await {
            match wakeup {
                Wakeup::Item => ctx.process_one(),
                Wakeup::Shutdown => {
                    debug!("worker {} received shutdown", ctx.index);
                    break;
                }
            }
        }
    });

    info!("🛑 Worker {} stopped", ctx.index);
}

impl WorkerContext {
    /// Pops and handles at most one queued item.
    fn process_one(&self) {
        let Some(mut item) = self.queue.pop() else {
            warn!("worker {} woken with an empty queue", self.index);
            return;
        };
        let work = item.take();
        trace!("worker {} took item {}", self.index, item.slot());
        self.items.release(item);

        match work {
            Some(Work::Inbound { socket, listener }) => self.open_inbound(socket, listener),
            Some(Work::Outbound { connector }) => self.open_outbound(connector),
            None => warn!("worker {} popped an empty item", self.index),
        }
    }

    fn open_inbound(&self, socket: std::net::TcpStream, listener: Arc<ListenerContext>) {
        let peer = socket
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let stream = match socket
            .set_nonblocking(true)
            .and_then(|()| TcpStream::from_std(socket))
        {
            Ok(stream) => stream,
            Err(e) => {
                error!("worker {}: socket from {} unusable: {}", self.index, peer, e);
                return;
            }
        };

        let conn = Connection::new(
            self.registry.next_id(),
            peer,
            self.index,
            listener.callbacks().clone(),
            None,
        );
        let (sender, output) = mpsc::unbounded_channel();
        conn.attach_output(sender);
        self.registry.insert(&conn);
        debug!(
            "{}: new connection {} from {} on worker {}",
            listener.name(),
            conn.id(),
            conn.peer_addr(),
            self.index
        );

        conn.callbacks().on_connect(&conn, true);
        tokio::task::spawn_local(io::drive(
            conn,
            stream,
            output,
            self.max_payload,
            self.registry.clone(),
        ));
    }

    fn open_outbound(&self, connector: Arc<Connector>) {
        let conn = Connection::new(
            self.registry.next_id(),
            connector.addr_text().to_string(),
            self.index,
            connector.callbacks().clone(),
            Some(Arc::downgrade(&connector)),
        );
        conn.set_state(ConnState::Connecting);
        connector.begin_connect(&conn);
        self.registry.insert(&conn);

        let target = connector.target();
        let registry = self.registry.clone();
        let max_payload = self.max_payload;
        let index = self.index;

        tokio::task::spawn_local(async move {
            match TcpStream::connect(target).await {
                Ok(stream) => {
                    let (sender, output) = mpsc::unbounded_channel();
                    if !establish(&conn, sender) {
                        debug!("connect to {} finished after shutdown was requested", target);
                        registry.remove(conn.id());
                        return;
                    }
                    info!("✅ Connected to {} on worker {}", target, index);
                    io::drive(conn, stream, output, max_payload, registry).await;
                }
                Err(e) => {
                    warn!("❌ Connect to {} failed: {}", target, e);
                    conn.fail_connect();
                    registry.remove(conn.id());
                }
            }
        });
    }
}

/// Publishes an outbound connection whose socket just connected.
///
/// A connection shut down while it was still connecting is reported as a
/// failed attempt instead, and `false` is returned.
fn establish(conn: &Connection, sender: mpsc::UnboundedSender<Vec<u8>>) -> bool {
    conn.attach_output(sender);
    if conn.state() == ConnState::Closed {
        conn.fail_connect();
        return false;
    }
    if let Some(connector) = conn.connector() {
        connector.mark_connected(conn.id());
    }
    conn.callbacks().on_connect(conn, true);
    true
}
