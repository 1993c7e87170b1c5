//! Shared work queues.
//!
//! An unbounded multi-producer, multi-consumer FIFO on top of
//! `crossbeam_channel`, split into a [`WorkSender`] and a [`WorkReceiver`]
//! half. Both halves clone cheaply and can be shared across threads.
//!
//! The queue closes when every sender has been dropped. Receivers still get
//! the items already queued, then [`WorkReceiver::pop`] returns `None`.
//! Backpressure is the caller's job: the coordinator never has more than the
//! run's target count of items outstanding.

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Create a connected sender/receiver pair.
pub fn work_queue<T>() -> (WorkSender<T>, WorkReceiver<T>) {
    let (tx, rx) = unbounded();
    (WorkSender { tx }, WorkReceiver { rx })
}

pub struct WorkSender<T> {
    tx: Sender<T>,
}

impl<T> WorkSender<T> {
    /// Append an item. Never blocks.
    ///
    /// Returns `false` if every receiver is gone and the item was dropped.
    pub fn push(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> Clone for WorkSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

pub struct WorkReceiver<T> {
    rx: Receiver<T>,
}

impl<T> WorkReceiver<T> {
    /// Take the front item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take the front item, waiting while the queue is empty but open.
    ///
    /// Returns `None` once every sender is gone and the queue is drained.
    pub fn pop(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Discard everything currently queued. Returns how many items went.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Clone for WorkReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}
