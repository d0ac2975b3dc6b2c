use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moneronet_apis::ObjectKey;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use crate::context::BackoffConfig;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    /// Keys added again while a pass for them was running.
    dirty: HashSet<ObjectKey>,
}

/// Single-flight work queue.
///
/// A key is handed to at most one worker at a time. Adding a key that is
/// already queued is a no-op; adding one that is being processed marks it
/// dirty so it is queued again once [`done`](Self::done) is called.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    failures: DashMap<ObjectKey, u32>,
    delayed: AtomicUsize,
    backoff: BackoffConfig,
}

impl WorkQueue {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            failures: DashMap::new(),
            delayed: AtomicUsize::new(0),
            backoff,
        }
    }

    pub fn add(&self, key: ObjectKey) {
        let mut state = self.state.lock();
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.pending.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Adds `key` once `delay` has passed.
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        self.delayed.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
            queue.delayed.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn pop(&self) -> Option<ObjectKey> {
        let mut state = self.state.lock();
        let key = state.pending.pop_front()?;
        state.queued.remove(&key);
        state.processing.insert(key.clone());
        Some(key)
    }

    /// Waits for the next key. Returns `None` once `shutdown` flips to true.
    pub async fn next(&self, shutdown: &mut watch::Receiver<bool>) -> Option<ObjectKey> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            if let Some(key) = self.pop() {
                return Some(key);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Marks the pass for `key` finished, re-queueing it if it went dirty.
    pub fn done(&self, key: &ObjectKey) {
        let mut state = self.state.lock();
        state.processing.remove(key);
        if state.dirty.remove(key) && state.queued.insert(key.clone()) {
            state.pending.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Records a failure for `key` and returns the delay before its retry.
    pub fn backoff(&self, key: &ObjectKey) -> Duration {
        let mut failures = self.failures.entry(key.clone()).or_insert(0);
        *failures = failures.saturating_add(1);
        self.backoff.delay(*failures)
    }

    /// Clears the failure history of `key` after a successful pass.
    pub fn forget(&self, key: &ObjectKey) {
        self.failures.remove(key);
    }

    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key).map(|n| *n).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing queued, running, dirty, or waiting on a retry timer.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty()
            && state.processing.is_empty()
            && state.dirty.is_empty()
            && self.delayed.load(Ordering::SeqCst) == 0
    }

    /// Wakes idle workers so they notice a shutdown.
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }
}
