//! A concurrent map with a terminal "sealed" state and a drain wait.
//!
//! The executor keeps in-flight top-level tasks in one of these: shutdown
//! seals the map so nothing new enters, then waits for running tasks to
//! remove themselves on completion.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

struct Inner<K, V> {
    map: HashMap<K, V>,
    sealed: bool,
}

pub struct DrainableMap<K, V> {
    inner: Mutex<Inner<K, V>>,
    drained: Notify,
}

impl<K: Eq + Hash + Clone, V> Default for DrainableMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, V> DrainableMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                sealed: false,
            }),
            drained: Notify::new(),
        }
    }

    /// Insert atomically unless the map is sealed or the key is present.
    /// Returns false without inserting in either case.
    pub fn insert(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock().expect("drainable map lock poisoned");
        if inner.sealed || inner.map.contains_key(&key) {
            return false;
        }
        inner.map.insert(key, value);
        true
    }

    /// Remove a key, waking drain waiters.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = {
            let mut inner = self.inner.lock().expect("drainable map lock poisoned");
            inner.map.remove(key)
        };
        if removed.is_some() {
            self.drained.notify_waiters();
        }
        removed
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner
            .lock()
            .expect("drainable map lock poisoned")
            .map
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("drainable map lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seal the map: every later `insert` fails. Irreversible.
    pub fn seal(&self) {
        let mut inner = self.inner.lock().expect("drainable map lock poisoned");
        inner.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.lock().expect("drainable map lock poisoned").sealed
    }

    /// Visit every entry under the map lock.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        let inner = self.inner.lock().expect("drainable map lock poisoned");
        for (key, value) in inner.map.iter() {
            f(key, value);
        }
    }

    /// Block until the map is empty. Returns false if `timeout` elapses
    /// first; `None` waits indefinitely.
    pub async fn wait_until_empty(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // Register for notification before checking emptiness so a
            // concurrent remove between the check and the await is not lost.
            let notified = self.drained.notified();
            if self.is_empty() {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.is_empty();
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> DrainableMap<K, V> {
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner
            .lock()
            .expect("drainable map lock poisoned")
            .map
            .get(key)
            .cloned()
    }
}
