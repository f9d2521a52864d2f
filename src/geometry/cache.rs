use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{generate_staircase, Staircase};

const DEFAULT_CAPACITY: usize = 256;

/// Memoized staircases keyed by `(seed, task_count)`.
///
/// Generation is deterministic, so a cached staircase is always identical to
/// a freshly generated one. When the cache fills up it is cleared wholesale.
#[derive(Debug, Clone)]
pub struct PathCache {
    capacity: usize,
    entries: Arc<Mutex<HashMap<(String, usize), Arc<Staircase>>>>,
}

impl PathCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn get_or_generate(&self, seed: &str, task_count: usize) -> Arc<Staircase> {
        let key = (seed.to_string(), task_count);
        let mut entries = self.entries.lock().expect("path cache lock poisoned");
        if let Some(hit) = entries.get(&key) {
            return Arc::clone(hit);
        }
        if entries.len() >= self.capacity {
            tracing::debug!("Path cache full ({} entries), clearing", entries.len());
            entries.clear();
        }
        let staircase = Arc::new(generate_staircase(task_count, seed));
        entries.insert(key, Arc::clone(&staircase));
        staircase
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("path cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
