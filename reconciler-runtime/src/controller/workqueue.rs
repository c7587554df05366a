//! A de-duplicating work queue with per-item backoff
use crate::config::RequeuePolicy;
use backon::ExponentialBackoff;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use std::{collections::VecDeque, fmt::Debug, hash::Hash, sync::Arc, time::Duration};
use tokio::sync::Notify;
use tracing::trace;

struct Backoff {
    requeues: usize,
    delays: ExponentialBackoff,
}

struct State<T> {
    /// Items ready to be handed out, in order
    queue: VecDeque<T>,
    /// Items that need processing, whether queued or waiting for their current run to finish
    dirty: HashSet<T>,
    /// Items currently handed out
    processing: HashSet<T>,
    backoffs: HashMap<T, Backoff>,
    shutting_down: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    policy: RequeuePolicy,
}

/// A queue of keys waiting to be reconciled
///
/// - Adding an item that is already queued is a no-op.
/// - An item is never handed to two consumers at once: adding an item that is being
///   processed queues it again once [`WorkQueue::done`] is called for it.
/// - Failed items can be re-added with an exponential per-item delay.
///
/// Cloning produces another handle to the same queue.
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WorkQueue<T>
where
    T: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Create an empty queue, delaying rate-limited items according to `policy`
    #[must_use]
    pub fn new(policy: RequeuePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    backoffs: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                policy,
            }),
        }
    }

    /// Mark `item` as needing processing
    pub fn add(&self, item: T) {
        let mut state = self.inner.state.lock();
        if state.shutting_down || !state.dirty.insert(item.clone()) {
            return;
        }
        if state.processing.contains(&item) {
            trace!(?item, "item in flight, deferring");
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// [`add`](Self::add) `item` once `delay` has passed
    ///
    /// Must be called within a tokio runtime unless `delay` is zero.
    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            return self.add(item);
        }
        if self.is_shutting_down() {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// [`add_after`](Self::add_after) `item` with the next delay of its backoff
    ///
    /// Delays grow with every call until [`forget`](Self::forget) resets them.
    pub fn add_rate_limited(&self, item: T) {
        let delay = {
            let mut state = self.inner.state.lock();
            let policy = self.inner.policy;
            let backoff = state.backoffs.entry(item.clone()).or_insert_with(|| Backoff {
                requeues: 0,
                delays: policy.backoff(),
            });
            backoff.requeues += 1;
            backoff.delays.next().unwrap_or(policy.max_delay)
        };
        trace!(?item, ?delay, "requeueing with backoff");
        self.add_after(item, delay);
    }

    /// Reset the backoff of `item`
    pub fn forget(&self, item: &T) {
        self.inner.state.lock().backoffs.remove(item);
    }

    /// How many times `item` has been rate-limited since it was last forgotten
    #[must_use]
    pub fn num_requeues(&self, item: &T) -> usize {
        self.inner
            .state
            .lock()
            .backoffs
            .get(item)
            .map_or(0, |b| b.requeues)
    }

    /// Wait for the next item
    ///
    /// Returns `None` once the queue has been shut down. Every item returned must be
    /// passed to [`done`](Self::done) after processing.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.inner.state.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.processing.insert(item.clone());
                    state.dirty.remove(&item);
                    if !state.queue.is_empty() {
                        self.inner.notify.notify_one();
                    }
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Finish processing `item`, queueing it again if it was added in the meantime
    pub fn done(&self, item: &T) {
        let mut state = self.inner.state.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Stop handing out items and wake every waiting consumer
    pub fn shut_down(&self) {
        self.inner.state.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    /// Whether [`shut_down`](Self::shut_down) has been called
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }

    /// Number of items waiting to be handed out
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether no items are waiting to be handed out
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
