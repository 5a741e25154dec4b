//! Actor Mailbox
//!
//! Per-actor FIFO queue with a soft capacity and a pluggable strategy for the
//! full-queue case. Producers enqueue from any task; only the owning actor's
//! drain turn dequeues.
//!
//! ## Backpressure policies
//! - **DropNew**: reject the incoming message, queue unchanged
//! - **DropOldest**: evict the head, accept the incoming message
//! - **BlockWithTimeout**: wait for space up to a deadline, then reject
//! - **DynamicGrow**: never reject, warn once when the soft limit is crossed

use crate::error::DeliveryError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

/// Default wait bound for `BlockWithTimeout`
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// Strategy applied when an enqueue finds the mailbox at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    DropNew,
    DropOldest,
    BlockWithTimeout { timeout: Duration },
    DynamicGrow,
}

impl BackpressurePolicy {
    /// BlockWithTimeout with the default 3s bound
    pub fn block() -> Self {
        Self::BlockWithTimeout {
            timeout: DEFAULT_BLOCK_TIMEOUT,
        }
    }
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self::DropNew
    }
}

/// Successful enqueue
#[derive(Debug)]
pub enum Admission<T> {
    /// Message queued, nothing displaced
    Accepted,
    /// Message queued after evicting the returned head (DropOldest)
    Evicted(T),
}

/// Message handed back to the producer with the rejection reason
pub struct Rejected<T> {
    pub message: T,
    pub reason: DeliveryError,
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("reason", &self.reason).finish()
    }
}

enum Push<T> {
    Done(Admission<T>),
    Full(T),
    Closed(T),
}

/// Mailbox counters
#[derive(Debug, Default)]
pub struct MailboxStats {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub evicted: AtomicU64,
    pub high_water_mark: AtomicUsize,
}

/// Bounded or growable actor mailbox
pub struct Mailbox<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: BackpressurePolicy,
    closed: AtomicBool,
    /// Wakes BlockWithTimeout producers when space frees up or on close
    space: Notify,
    grow_warned: AtomicBool,
    stats: MailboxStats,
}

impl<T> Mailbox<T> {
    /// Create mailbox with soft `capacity` (minimum 1)
    pub fn new(capacity: usize, policy: BackpressurePolicy) -> Self {
        let capacity = capacity.max(1);
        let initial = match policy {
            BackpressurePolicy::DynamicGrow => capacity,
            _ => capacity.min(1024),
        };
        Self {
            queue: Mutex::new(VecDeque::with_capacity(initial)),
            capacity,
            policy,
            closed: AtomicBool::new(false),
            space: Notify::new(),
            grow_warned: AtomicBool::new(false),
            stats: MailboxStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &MailboxStats {
        &self.stats
    }

    /// Offer a message, suspending only under BlockWithTimeout
    pub async fn enqueue(&self, message: T) -> Result<Admission<T>, Rejected<T>> {
        let timeout = match self.policy {
            BackpressurePolicy::BlockWithTimeout { timeout } => timeout,
            _ => return self.try_enqueue(message),
        };

        let started = Instant::now();
        let deadline = started + timeout;
        let mut message = message;
        loop {
            // Register interest before checking so a dequeue between the
            // check and the await is not missed.
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.push(message) {
                Push::Done(admission) => return Ok(admission),
                Push::Closed(m) => return Err(self.reject(m, DeliveryError::Closed)),
                Push::Full(m) => message = m,
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return match self.push(message) {
                    Push::Done(admission) => Ok(admission),
                    Push::Closed(m) => Err(self.reject(m, DeliveryError::Closed)),
                    Push::Full(m) => Err(self.reject(
                        m,
                        DeliveryError::Timeout {
                            waited_ms: started.elapsed().as_millis() as u64,
                        },
                    )),
                };
            }
        }
    }

    /// Offer a message without waiting; BlockWithTimeout behaves like DropNew
    pub fn try_enqueue(&self, message: T) -> Result<Admission<T>, Rejected<T>> {
        match self.push(message) {
            Push::Done(admission) => Ok(admission),
            Push::Full(m) => Err(self.reject(m, DeliveryError::MailboxFull)),
            Push::Closed(m) => Err(self.reject(m, DeliveryError::Closed)),
        }
    }

    fn push(&self, message: T) -> Push<T> {
        let mut queue = self.queue.lock();
        // Checked under the queue lock so nothing lands after close() returns
        if self.is_closed() {
            return Push::Closed(message);
        }

        let admission = if queue.len() < self.capacity {
            queue.push_back(message);
            Admission::Accepted
        } else {
            match self.policy {
                BackpressurePolicy::DropNew | BackpressurePolicy::BlockWithTimeout { .. } => {
                    return Push::Full(message);
                }
                BackpressurePolicy::DropOldest => {
                    let oldest = queue.pop_front();
                    queue.push_back(message);
                    match oldest {
                        Some(oldest) => {
                            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
                            Admission::Evicted(oldest)
                        }
                        None => Admission::Accepted,
                    }
                }
                BackpressurePolicy::DynamicGrow => {
                    queue.push_back(message);
                    if !self.grow_warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            soft_limit = self.capacity,
                            queue_len = queue.len(),
                            "Mailbox exceeded soft limit, growing unbounded"
                        );
                    }
                    Admission::Accepted
                }
            }
        };

        self.stats.high_water_mark.fetch_max(queue.len(), Ordering::Relaxed);
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        Push::Done(admission)
    }

    fn reject(&self, message: T, reason: DeliveryError) -> Rejected<T> {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        Rejected { message, reason }
    }

    /// Remove the head message
    pub fn pop(&self) -> Option<T> {
        let message = self.queue.lock().pop_front();
        if message.is_some() {
            self.space.notify_waiters();
        }
        message
    }

    /// Refuse further enqueues and wake blocked producers
    ///
    /// Messages already queued stay poppable so the owner can drain them.
    pub fn close(&self) {
        {
            let _queue = self.queue.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.space.notify_waiters();
    }
}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish()
    }
}
