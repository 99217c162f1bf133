use super::worker::{self, WorkerContext};
use super::{Wakeup, Work};
use crate::config::NetConfig;
use crate::connection::{Connection, ConnectionId, ConnectionRegistry};
use crate::connector::Connector;
use crate::error::NetError;
use crate::listener::ListenerContext;
use crate::queue::{ItemPool, WorkQueue};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

struct WorkerHandle {
    index: usize,
    queue: Arc<WorkQueue<Work>>,
    wakeup: mpsc::UnboundedSender<Wakeup>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Pool of worker threads, each running its own event loop.
///
/// The pool is ordinary instance state: several pools can coexist in one
/// process, each with its own workers, round-robin cursor and connection
/// registry. The queue item freelist is shared by all of a pool's workers.
///
/// # Lifecycle
///
/// [`ReactorPool::start`] returns only after every worker has reported
/// ready. [`ReactorPool::shutdown`] (or dropping the pool) stops the event
/// loops and joins the threads; connections still open at that point are
/// dropped without further callbacks.
pub struct ReactorPool {
    workers: Vec<WorkerHandle>,
    cursor: AtomicUsize,
    items: Arc<ItemPool<Work>>,
    registry: Arc<ConnectionRegistry>,
    ready: Arc<AtomicUsize>,
    config: NetConfig,
}

impl ReactorPool {
    /// Starts `config.workers` worker threads and waits until all are ready.
    ///
    /// # Errors
    ///
    /// [`NetError::Config`] for an invalid configuration and
    /// [`NetError::WorkerSetup`] if any worker thread or event loop could not
    /// be created. Workers that did start are stopped before returning.
    pub fn start(config: &NetConfig) -> Result<Self, NetError> {
        config.validate()?;

        let items = Arc::new(ItemPool::new(config.items_per_alloc));
        let registry = Arc::new(ConnectionRegistry::new());
        let ready = Arc::new(AtomicUsize::new(0));
        let (ready_tx, ready_rx) = crossbeam::channel::bounded(config.workers);

        let mut pool = Self {
            workers: Vec::with_capacity(config.workers),
            cursor: AtomicUsize::new(0),
            items,
            registry,
            ready,
            config: config.clone(),
        };

        for index in 0..config.workers {
            let queue = Arc::new(WorkQueue::new());
            let (wakeup, wakeups) = mpsc::unbounded_channel();
            let ctx = WorkerContext {
                index,
                queue: queue.clone(),
                items: pool.items.clone(),
                registry: pool.registry.clone(),
                ready: pool.ready.clone(),
                max_payload: config.max_payload(),
            };

            let name = format!("{}-{}", config.thread_name_prefix, index);
            let thread = worker::spawn(name, ctx, wakeups, ready_tx.clone()).map_err(|e| {
                error!("❌ Failed to spawn worker {}: {}", index, e);
                NetError::WorkerSetup(format!("spawn worker {index}: {e}"))
            })?;

            pool.workers.push(WorkerHandle {
                index,
                queue,
                wakeup,
                thread: Mutex::new(Some(thread)),
            });
        }
        drop(ready_tx);

        for _ in 0..config.workers {
            match ready_rx.recv() {
                Ok(Ok(_)) => {}
                Ok(Err(reason)) => {
                    error!("❌ Worker setup failed: {}", reason);
                    return Err(NetError::WorkerSetup(reason));
                }
                Err(_) => {
                    error!("❌ Worker exited before reporting ready");
                    return Err(NetError::WorkerSetup(
                        "worker exited before reporting ready".into(),
                    ));
                }
            }
        }

        info!("🚀 Reactor pool started with {} workers", pool.workers.len());
        Ok(pool)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers that have completed startup.
    pub fn ready_workers(&self) -> usize {
        self.ready.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Hands an accepted socket to the next worker.
    ///
    /// # Returns
    ///
    /// The index of the worker that will service the connection.
    pub fn dispatch_inbound(
        &self,
        socket: TcpStream,
        listener: Arc<ListenerContext>,
    ) -> Result<usize, NetError> {
        self.dispatch(Work::Inbound { socket, listener })
    }

    /// Hands a connect attempt for `connector` to the next worker.
    ///
    /// The connector is moved to Connecting before the attempt is queued and
    /// back to NotConnected if the attempt cannot be delivered.
    ///
    /// # Errors
    ///
    /// [`NetError::AlreadyConnected`] unless the connector is NotConnected.
    pub fn dispatch_outbound(&self, connector: Arc<Connector>) -> Result<usize, NetError> {
        connector.claim()?;
        self.dispatch(Work::Outbound {
            connector: connector.clone(),
        })
        .map_err(|e| {
            connector.abandon();
            e
        })
    }

    fn dispatch(&self, work: Work) -> Result<usize, NetError> {
        let item = self.items.acquire(work).map_err(|e| {
            error!("❌ Failed to allocate queue item: {}", e);
            e
        })?;

        let index = self.next_worker();
        let worker = &self.workers[index];
        worker.queue.push(item);

        if worker.wakeup.send(Wakeup::Item).is_err() {
            // The worker has left its loop; take back what it will never pop.
            if let Some(item) = worker.queue.pop() {
                self.items.release(item);
            }
            warn!("worker {} is no longer accepting work", index);
            return Err(NetError::WorkerUnavailable(index));
        }
        Ok(index)
    }

    fn next_worker(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Returns a new reference to a live connection.
    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.registry.get(id)
    }

    /// Number of connections currently registered.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Writes `message` to every connected connection of this pool.
    pub fn broadcast(&self, message: &[u8]) -> usize {
        self.registry.broadcast(message)
    }

    /// Stops every worker's event loop and joins its thread.
    ///
    /// Best effort: queued items and open connections are dropped without
    /// `on_disconnect`. Connectors whose link was dropped this way read as
    /// NotConnected afterwards, and connect attempts that never reached a
    /// worker are abandoned. Safe to call more than once and from a worker
    /// thread, which is then left to exit on its own.
    pub fn shutdown(&self) {
        for worker in &self.workers {
            let _ = worker.wakeup.send(Wakeup::Shutdown);
        }

        let current = thread::current().id();
        for worker in &self.workers {
            let mut thread = worker
                .thread
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = thread.take() {
                if handle.thread().id() == current {
                    *thread = Some(handle);
                    continue;
                }
                if handle.join().is_err() {
                    error!("worker {} panicked", worker.index);
                }
            }
            drop(thread);
            self.drain(worker);
        }
    }

    /// Empties a stopped worker's queue.
    fn drain(&self, worker: &WorkerHandle) {
        while let Some(mut item) = worker.queue.pop() {
            if let Some(Work::Outbound { connector }) = item.take() {
                connector.abandon();
            }
            self.items.release(item);
        }
    }
}

impl Drop for ReactorPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ReactorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorPool")
            .field("workers", &self.workers.len())
            .field("connections", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}
