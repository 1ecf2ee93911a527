//! Per-key trailing-edge debouncing on the tokio runtime.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Gate = Arc<tokio::sync::Mutex<()>>;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner<K> {
    next_generation: u64,
    /// Actions still waiting out the delay
    pending: HashMap<K, Pending>,
    /// One per key with an action running or queued behind one
    gates: HashMap<K, Gate>,
    running: usize,
}

/// Runs the last action scheduled for a key once the key has been quiet for
/// `delay`. Scheduling again aborts the earlier pending action.
///
/// An action that has started running is no longer pending and is not
/// aborted by a later schedule. Actions for the same key never overlap: a
/// later one waits until the earlier one has finished.
pub struct Debouncer<K> {
    delay: Duration,
    inner: Arc<Mutex<Inner<K>>>,
}

impl<K> Clone for Debouncer<K> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Counts a started action and releases its key when the task ends,
/// including on panic.
struct Started<K: Eq + Hash> {
    table: Arc<Mutex<Inner<K>>>,
    key: K,
    gate: Option<Gate>,
}

impl<K: Eq + Hash> Drop for Started<K> {
    fn drop(&mut self) {
        drop(self.gate.take());
        let mut inner = self.table.lock();
        inner.running -= 1;
        if inner
            .gates
            .get(&self.key)
            .is_some_and(|g| Arc::strong_count(g) == 1)
        {
            inner.gates.remove(&self.key);
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: Arc::new(Mutex::new(Inner {
                next_generation: 0,
                pending: HashMap::new(),
                gates: HashMap::new(),
                running: 0,
            })),
        }
    }

    pub fn schedule<F, Fut>(&self, key: K, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;

        if let Some(previous) = inner.pending.remove(&key) {
            previous.handle.abort();
        }

        let delay = self.delay;
        let table = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let gate = {
                let mut inner = table.lock();
                match inner.pending.get(&task_key) {
                    Some(p) if p.generation == generation => {
                        inner.pending.remove(&task_key);
                    }
                    // Superseded between wake-up and lock
                    _ => return,
                }
                inner.running += 1;
                Arc::clone(inner.gates.entry(task_key.clone()).or_default())
            };
            let started = Started {
                table,
                key: task_key,
                gate: Some(Arc::clone(&gate)),
            };
            let turn = gate.lock_owned().await;
            action().await;
            drop(turn);
            drop(started);
        });

        inner.pending.insert(key, Pending { generation, handle });
    }

    /// Drop the pending action for `key`. Returns true if one was pending.
    ///
    /// An action already running is left to finish.
    pub fn cancel(&self, key: &K) -> bool {
        match self.inner.lock().pending.remove(key) {
            Some(p) => {
                p.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, p) in self.inner.lock().pending.drain() {
            p.handle.abort();
        }
    }

    /// Actions waiting out the delay or running.
    pub fn pending_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.pending.len() + inner.running
    }

    /// Poll every `interval` until no action is pending or running.
    /// Returns false if `deadline` passed first.
    pub async fn wait_idle(&self, interval: Duration, deadline: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.pending_count() == 0 {
                return true;
            }
            if started.elapsed() >= deadline {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}
