//! Coalescing work queue.
//!
//! A key is either queued, being processed, or neither. Adding a queued key
//! is a no-op; adding a key that is being processed marks it dirty so it is
//! queued again once [`WorkQueue::done`] is called. Together this gives at
//! most one pass per key at a time with no lost notifications.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
    shutting_down: bool,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            processing: HashSet::new(),
            dirty: HashSet::new(),
            shutting_down: false,
        }
    }
}

#[derive(Debug)]
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

impl<K> Default for WorkQueue<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key` unless it is already queued. Returns `true` if it was
    /// added or marked for another pass.
    pub async fn add(&self, key: K) -> bool {
        let mut state = self.state.lock().await;
        if state.shutting_down || state.queued.contains(&key) {
            return false;
        }
        if state.processing.contains(&key) {
            return state.dirty.insert(key);
        }
        state.queued.insert(key.clone());
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Queue `key` after `delay`.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    /// The key stays marked as processing until [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Finish processing `key`, re-queueing it if it was added meanwhile.
    pub async fn done(&self, key: &K) {
        let mut state = self.state.lock().await;
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shutting_down && state.queued.insert(key.clone()) {
            state.queue.push_back(key.clone());
            drop(state);
            debug!("Key changed during processing, queued again");
            self.notify.notify_one();
        }
    }

    /// Wake all waiters; `get` returns `None` from now on.
    pub async fn shut_down(&self) {
        self.state.lock().await.shutting_down = true;
        self.notify.notify_waiters();
    }

    pub async fn is_shutting_down(&self) -> bool {
        self.state.lock().await.shutting_down
    }

    /// Keys waiting to be processed.
    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.queue.is_empty()
    }

    pub async fn is_processing(&self, key: &K) -> bool {
        self.state.lock().await.processing.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Given a key that is already queued
    /// When it is added again
    /// Then the queue still holds it once
    #[tokio::test]
    async fn duplicate_adds_are_coalesced() {
        let queue = WorkQueue::new();
        assert!(queue.add("a").await);
        assert!(!queue.add("a").await);
        assert!(queue.add("b").await);
        assert_eq!(queue.len().await, 2);
    }

    /// Given a key that is being processed
    /// When it is added during processing
    /// Then it is not handed out again until done() is called
    #[tokio::test]
    async fn key_added_while_processing_is_requeued_on_done() {
        let queue = WorkQueue::new();
        queue.add("a").await;
        assert_eq!(queue.get().await, Some("a"));

        assert!(queue.add("a").await);
        assert!(queue.is_empty().await);
        assert!(queue.is_processing(&"a").await);

        queue.done(&"a").await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.get().await, Some("a"));
    }

    /// Given a processed key that was not touched
    /// When done() is called
    /// Then nothing is queued
    #[tokio::test]
    async fn done_without_changes_does_not_requeue() {
        let queue = WorkQueue::new();
        queue.add(1u32).await;
        let key = queue.get().await;
        assert_eq!(key, Some(1));
        queue.done(&1).await;
        assert!(queue.is_empty().await);
        assert!(!queue.is_processing(&1).await);
    }

    /// Given a worker blocked in get()
    /// When the queue shuts down
    /// Then get() returns None
    #[tokio::test]
    async fn shut_down_releases_waiters() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.shut_down().await;
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert_eq!(result.ok().and_then(|r| r.ok()), Some(None));
        assert!(!queue.add(7).await);
    }

    /// Given a delayed add
    /// When the delay elapses
    /// Then the key becomes available
    #[tokio::test(start_paused = true)]
    async fn add_after_delays_the_key() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
        queue.add_after(5, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(queue.is_empty().await);

        let key = tokio::time::timeout(Duration::from_secs(5), queue.get()).await;
        assert_eq!(key.ok().flatten(), Some(5));
    }

    /// Given a waiting worker
    /// When a key is added
    /// Then the worker wakes up with it
    #[tokio::test]
    async fn add_wakes_waiting_worker() {
        let queue: Arc<WorkQueue<&'static str>> = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.add("x").await;

        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert_eq!(result.ok().and_then(|r| r.ok()), Some(Some("x")));
    }
}
