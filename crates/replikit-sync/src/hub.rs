//! Bounded pub/sub used to broadcast collection change events.
//!
//! A [`Hub`] fans values out to any number of [`Subscription`]s, each with
//! its own queue starting at the point of subscription. What happens when
//! a queue is full is the subscriber's [`OverflowStrategy`]: grow without
//! bound, drop the oldest, drop the newest, or block the publisher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// What a full subscriber queue does with the next published value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Queues grow without bound; publish never waits.
    Unbounded,
    /// Keep the newest `cap` values, dropping the oldest on overflow.
    Sliding(usize),
    /// Keep the oldest `cap` values, dropping new publishes on overflow.
    Dropping(usize),
    /// Block the publisher until the subscriber makes room.
    Backpressure(usize),
}

struct SubscriberState<T> {
    queue: Mutex<VecDeque<T>>,
    /// Signaled when a value is queued or the hub closes.
    readable: Notify,
    /// Signaled when space frees up (for `Backpressure` publishers).
    writable: Notify,
    closed: AtomicBool,
}

impl<T> SubscriberState<T> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            readable: Notify::new(),
            writable: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }
}

struct HubInner<T> {
    strategy: OverflowStrategy,
    subscribers: Mutex<Vec<Arc<SubscriberState<T>>>>,
    closed: AtomicBool,
}

/// A multi-subscriber broadcast queue.
///
/// Clones share the same subscriber list, so any clone can publish.
///
/// # Example
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// use replikit_sync::hub::{Hub, OverflowStrategy};
///
/// let hub = Hub::new(OverflowStrategy::Sliding(8));
/// let mut sub = hub.subscribe();
///
/// hub.publish("hello").await;
/// assert_eq!(sub.recv().await, Some("hello"));
/// # });
/// ```
pub struct Hub<T> {
    inner: Arc<HubInner<T>>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Hub<T> {
    /// Create a hub with the given overflow strategy.
    #[must_use]
    pub fn new(strategy: OverflowStrategy) -> Self {
        Self {
            inner: Arc::new(HubInner {
                strategy,
                subscribers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe; the subscription sees values published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let state = Arc::new(SubscriberState::new());
        if self.inner.closed.load(Ordering::Acquire) {
            state.closed.store(true, Ordering::Release);
        } else {
            self.inner.subscribers.lock().unwrap().push(Arc::clone(&state));
        }
        Subscription { state }
    }

    /// Publish a value to every live subscriber.
    ///
    /// Completes immediately under every strategy except
    /// [`OverflowStrategy::Backpressure`], which waits for each full
    /// subscriber to make room.
    pub async fn publish(&self, value: T) {
        let subscribers: Vec<Arc<SubscriberState<T>>> = {
            let mut list = self.inner.subscribers.lock().unwrap();
            list.retain(|s| !s.closed.load(Ordering::Acquire));
            list.clone()
        };

        for subscriber in subscribers {
            match self.inner.strategy {
                OverflowStrategy::Unbounded => {
                    subscriber.queue.lock().unwrap().push_back(value.clone());
                    subscriber.readable.notify_one();
                }
                OverflowStrategy::Sliding(cap) => {
                    let mut queue = subscriber.queue.lock().unwrap();
                    if queue.len() >= cap {
                        queue.pop_front();
                    }
                    queue.push_back(value.clone());
                    drop(queue);
                    subscriber.readable.notify_one();
                }
                OverflowStrategy::Dropping(cap) => {
                    let mut queue = subscriber.queue.lock().unwrap();
                    if queue.len() < cap {
                        queue.push_back(value.clone());
                        drop(queue);
                        subscriber.readable.notify_one();
                    }
                }
                OverflowStrategy::Backpressure(cap) => loop {
                    if subscriber.closed.load(Ordering::Acquire) {
                        break;
                    }
                    {
                        let mut queue = subscriber.queue.lock().unwrap();
                        if queue.len() < cap {
                            queue.push_back(value.clone());
                            drop(queue);
                            subscriber.readable.notify_one();
                            break;
                        }
                    }
                    subscriber.writable.notified().await;
                },
            }
        }
    }

    /// Close the hub: subscribers drain their queues and then end.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let list = self.inner.subscribers.lock().unwrap();
        for subscriber in list.iter() {
            subscriber.closed.store(true, Ordering::Release);
            subscriber.readable.notify_one();
            subscriber.writable.notify_one();
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut list = self.inner.subscribers.lock().unwrap();
        list.retain(|s| !s.closed.load(Ordering::Acquire));
        list.len()
    }
}

/// One subscriber's end of a [`Hub`].
///
/// Values arrive in publish order. Dropping the subscription releases any
/// blocked publisher.
pub struct Subscription<T> {
    state: Arc<SubscriberState<T>>,
}

impl<T> Subscription<T> {
    /// Wait for the next value. Returns `None` once the hub is closed and
    /// the queue drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut queue = self.state.queue.lock().unwrap();
                if let Some(value) = queue.pop_front() {
                    drop(queue);
                    self.state.writable.notify_one();
                    return Some(value);
                }
                if self.state.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.state.readable.notified().await;
        }
    }

    /// The next queued value, if one is already waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        let value = self.state.queue.lock().unwrap().pop_front();
        if value.is_some() {
            self.state.writable.notify_one();
        }
        value
    }

    /// Number of values waiting in this subscription's queue.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.state.queue.lock().unwrap().len()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.state.closed.store(true, Ordering::Release);
        self.state.writable.notify_one();
    }
}
