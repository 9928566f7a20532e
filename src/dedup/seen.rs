// src/dedup/seen.rs
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

pub const SEEN_KEYS_CAPACITY: usize = 5_000;

/// Insertion-ordered set with a hard cap; the oldest insert is evicted first.
///
/// Re-inserting an existing key does not refresh its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SeenKeys {
    order: VecDeque<String>,
    index: HashSet<String>,
    cap: usize,
}

impl Default for SeenKeys {
    fn default() -> Self {
        Self::with_capacity(SEEN_KEYS_CAPACITY)
    }
}

impl SeenKeys {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            order: VecDeque::with_capacity(cap.min(SEEN_KEYS_CAPACITY)),
            index: HashSet::new(),
            cap,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    pub fn contains_any<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        keys.iter().any(|k| self.contains(k.as_ref()))
    }

    /// Returns `false` when the key was already present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.index.contains(&key) {
            return false;
        }
        self.index.insert(key.clone());
        self.order.push_back(key);
        while self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.index.remove(&old);
            }
        }
        true
    }

    pub fn extend<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for k in keys {
            self.insert(k);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for SeenKeys {
    /// Persisted lists may be longer than the cap; the newest entries win.
    fn from(v: Vec<String>) -> Self {
        let mut s = Self::default();
        s.extend(v);
        s
    }
}

impl From<SeenKeys> for Vec<String> {
    fn from(s: SeenKeys) -> Self {
        s.order.into_iter().collect()
    }
}
