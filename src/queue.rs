// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deduplicating per-key work queue with delayed re-enqueue and backoff.
//!
//! The queue is the only ordering and retry authority in the operator: the
//! reconciler never sleeps or loops internally, it just reports success or
//! failure and the queue decides when the key runs again.
//!
//! Semantics:
//!
//! - `add` while a key is pending coalesces into the existing entry
//! - `add` while a key is being processed marks it dirty; `done` then
//!   re-queues it exactly once, so a change arriving mid-pass is deferred,
//!   never dropped
//! - `get` hands a key to at most one worker at a time
//! - `add_rate_limited` applies exponential per-key backoff with jitter;
//!   `forget` resets the failure count after a success
//! - after `shut_down`, `get` returns `None` once the backlog drains and no
//!   new keys are accepted, letting in-flight passes finish cleanly

use rand::RngExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// First retry delay for a failing key
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Ceiling for the per-key retry delay
const BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Jitter applied to every backoff delay (±10%)
const BACKOFF_JITTER: f64 = 0.1;

struct QueueState<K> {
    queue: VecDeque<K>,
    /// Keys currently in `queue`
    pending: HashSet<K>,
    /// Keys handed to a worker and not yet `done`
    active: HashSet<K>,
    /// Active keys that were re-added mid-pass
    dirty: HashSet<K>,
    /// Consecutive failure count per key
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

/// Work queue serializing reconcile passes per key.
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

impl<K> Default for WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + std::fmt::Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + std::fmt::Debug + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                pending: HashSet::new(),
                active: HashSet::new(),
                dirty: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a key. Idempotent while the key is already pending; a key
    /// being processed is marked dirty and re-queued once its pass finishes.
    pub fn add(&self, key: K) {
        let mut state = self.state.lock().unwrap();
        if state.shutting_down {
            return;
        }
        if state.active.contains(&key) {
            debug!(?key, "Key in-flight, deferring one more pass");
            state.dirty.insert(key);
            return;
        }
        if state.pending.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Enqueue a key after a delay.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if self.state.lock().unwrap().shutting_down {
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Enqueue a key with exponential backoff based on its consecutive
    /// failure count.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let attempt = {
            let mut state = self.state.lock().unwrap();
            if state.shutting_down {
                return;
            }
            let count = state.failures.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let delay = backoff_for(attempt);
        debug!(?key, attempt, ?delay, "Scheduling rate-limited retry");
        self.add_after(key, delay);
    }

    /// Reset a key's failure count after a successful pass.
    pub fn forget(&self, key: &K) {
        self.state.lock().unwrap().failures.remove(key);
    }

    /// Consecutive failure count for a key.
    #[must_use]
    pub fn failures(&self, key: &K) -> u32 {
        self.state
            .lock()
            .unwrap()
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Wait for the next key and mark it in-flight. Returns `None` once the
    /// queue is shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(key) = state.queue.pop_front() {
                    state.pending.remove(&key);
                    state.active.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Release the in-flight mark for a key; if it was re-added mid-pass, it
    /// goes back on the queue for exactly one more pass.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.state.lock().unwrap();
            state.active.remove(key);
            if state.dirty.remove(key) && !state.shutting_down && state.pending.insert(key.clone())
            {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Number of keys waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and wake every blocked `get` so workers can
    /// drain the backlog and exit.
    pub fn shut_down(&self) {
        self.state.lock().unwrap().shutting_down = true;
        self.notify.notify_waiters();
    }
}

/// Exponential backoff for the nth consecutive failure, capped and jittered.
#[must_use]
pub fn backoff_for(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    let raw = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(exp)).min(BACKOFF_MAX);
    let jitter = 1.0 + rand::rng().random_range(-BACKOFF_JITTER..BACKOFF_JITTER);
    raw.mul_f64(jitter)
}
