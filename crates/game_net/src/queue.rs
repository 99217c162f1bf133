//! Work queue and queue item freelist.
//!
//! Producers (the accepting context, connector creation) hand new work to a
//! worker by pushing a [`QueueItem`] onto that worker's [`WorkQueue`]. Items
//! are borrowed from a shared [`ItemPool`] that grows in fixed-size batches
//! and takes items back as soon as a worker has consumed them, so steady-state
//! dispatch does not allocate.

use crate::error::NetError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One unit of pending work.
///
/// `slot` is a stable identity assigned when the item is first allocated and
/// kept across recycling.
#[derive(Debug)]
pub struct QueueItem<T> {
    slot: usize,
    value: Option<T>,
}

impl<T> QueueItem<T> {
    /// Identity of the underlying storage, stable across reuse.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Takes the carried work out, leaving the item empty.
    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }
}

/// Recyclable pool of queue items.
///
/// The free list is guarded by its own lock, separate from any queue lock.
/// An item is either on the free list or owned by exactly one caller, never
/// both.
#[derive(Debug)]
pub struct ItemPool<T> {
    free: Mutex<Vec<Box<QueueItem<T>>>>,
    per_alloc: usize,
    allocated: AtomicUsize,
}

impl<T> ItemPool<T> {
    /// Creates an empty pool that grows `per_alloc` items at a time.
    pub fn new(per_alloc: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            per_alloc: per_alloc.max(1),
            allocated: AtomicUsize::new(0),
        }
    }

    fn free_list(&self) -> MutexGuard<'_, Vec<Box<QueueItem<T>>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrows an item from the free list and loads `value` into it.
    ///
    /// When the free list is empty a new batch is allocated; one item of the
    /// batch is returned and the rest are put on the free list.
    pub fn acquire(&self, value: T) -> Result<Box<QueueItem<T>>, NetError> {
        if let Some(mut item) = self.free_list().pop() {
            item.value = Some(value);
            return Ok(item);
        }

        let mut batch: Vec<Box<QueueItem<T>>> = Vec::new();
        batch
            .try_reserve_exact(self.per_alloc - 1)
            .map_err(|e| NetError::Allocation(format!("queue item batch: {e}")))?;

        let base = self.allocated.fetch_add(self.per_alloc, Ordering::Relaxed);
        for offset in 1..self.per_alloc {
            batch.push(Box::new(QueueItem {
                slot: base + offset,
                value: None,
            }));
        }

        self.free_list().append(&mut batch);
        Ok(Box::new(QueueItem {
            slot: base,
            value: Some(value),
        }))
    }

    /// Returns an item to the free list. Any work still inside is dropped.
    pub fn release(&self, mut item: Box<QueueItem<T>>) {
        item.value = None;
        self.free_list().push(item);
    }

    /// Total items ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Items currently sitting on the free list.
    pub fn available(&self) -> usize {
        self.free_list().len()
    }
}

/// Lock-protected FIFO of pending items for one worker.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<Box<QueueItem<T>>>>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<Box<QueueItem<T>>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an item at the tail.
    pub fn push(&self, item: Box<QueueItem<T>>) {
        self.guard().push_back(item);
    }

    /// Removes the item at the head, if any.
    pub fn pop(&self) -> Option<Box<QueueItem<T>>> {
        self.guard().pop_front()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_queue_is_fifo() {
        let pool = ItemPool::new(4);
        let queue = WorkQueue::new();

        for value in 0..10u32 {
            queue.push(pool.acquire(value).expect("acquire"));
        }
        assert_eq!(queue.len(), 10);

        for expected in 0..10u32 {
            let mut item = queue.pop().expect("item should be queued");
            assert_eq!(item.take(), Some(expected));
            pool.release(item);
        }
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pool_grows_in_batches() {
        let pool: ItemPool<u32> = ItemPool::new(16);
        assert_eq!(pool.allocated(), 0);

        let first = pool.acquire(1).expect("acquire");
        assert_eq!(pool.allocated(), 16);
        assert_eq!(pool.available(), 15);

        let mut held = vec![first];
        for value in 0..15 {
            held.push(pool.acquire(value).expect("acquire"));
        }
        // Exactly one batch serves sixteen items.
        assert_eq!(pool.allocated(), 16);
        assert_eq!(pool.available(), 0);

        held.push(pool.acquire(99).expect("acquire"));
        assert_eq!(pool.allocated(), 32);
        assert_eq!(pool.available(), 15);
    }

    #[test]
    fn test_released_items_are_reused() {
        let pool = ItemPool::new(2);
        let item = pool.acquire("a").expect("acquire");
        let slot = item.slot();
        pool.release(item);

        let again = pool.acquire("b").expect("acquire");
        assert_eq!(again.slot(), slot);
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn test_release_drops_leftover_work() {
        let pool = ItemPool::new(1);
        let tracker = Arc::new(());
        let item = pool.acquire(tracker.clone()).expect("acquire");
        assert_eq!(Arc::strong_count(&tracker), 2);
        pool.release(item);
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_concurrent_push_pop_preserves_items() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;

        let pool = Arc::new(ItemPool::new(16));
        let queue = Arc::new(WorkQueue::new());
        let in_use = Arc::new(Mutex::new(HashSet::new()));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let pool = pool.clone();
                let queue = queue.clone();
                let in_use = in_use.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let item = pool.acquire(p * PER_PRODUCER + i).expect("acquire");
                        // No slot may be handed out while another owner holds it.
                        assert!(in_use.lock().unwrap().insert(item.slot()));
                        queue.push(item);
                    }
                })
            })
            .collect();

        let consumer = {
            let pool = pool.clone();
            let queue = queue.clone();
            let in_use = in_use.clone();
            thread::spawn(move || {
                let mut seen = Vec::with_capacity(PRODUCERS * PER_PRODUCER);
                while seen.len() < PRODUCERS * PER_PRODUCER {
                    match queue.pop() {
                        Some(mut item) => {
                            seen.push(item.take().expect("queued item carries work"));
                            assert!(in_use.lock().unwrap().remove(&item.slot()));
                            pool.release(item);
                        }
                        None => thread::yield_now(),
                    }
                }
                seen
            })
        };

        for producer in producers {
            producer.join().expect("producer thread");
        }
        let mut seen = consumer.join().expect("consumer thread");
        seen.sort_unstable();

        let expected: Vec<usize> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(seen, expected);
        assert!(queue.is_empty());
        assert!(in_use.lock().unwrap().is_empty());
        assert_eq!(pool.available(), pool.allocated());
    }
}
