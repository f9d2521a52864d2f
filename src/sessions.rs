//! Live per-user state, loaded on first use and written back in the background.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::db::Database;
use crate::store::StateStore;
use crate::sync::{DebouncedWriter, DocumentSink};

struct UserSession {
    store: StateStore,
    writer: Arc<DebouncedWriter>,
    last_used: Instant,
}

/// Registry of signed-in users' state stores.
///
/// Mutations run synchronously under one lock, so operations from the same
/// user apply in arrival order. Each session owns a [`DebouncedWriter`] that
/// persists the latest snapshot after a quiet period.
#[derive(Clone)]
pub struct Sessions {
    db: Database,
    delay: Duration,
    inner: Arc<Mutex<HashMap<String, UserSession>>>,
}

impl Sessions {
    pub fn new(db: Database, delay: Duration) -> Self {
        Self {
            db,
            delay,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn load(&self, user_id: &str) -> Result<UserSession> {
        let writer = Arc::new(DebouncedWriter::spawn(
            user_id,
            Arc::new(self.db.clone()) as Arc<dyn DocumentSink>,
            self.delay,
        ));
        let store = match self.db.get_state(user_id)? {
            Some(state) => StateStore::new(state),
            None => {
                tracing::info!("Creating fresh state for {}", user_id);
                let store = StateStore::default();
                writer.schedule(store.snapshot());
                store
            }
        };
        Ok(UserSession {
            store,
            writer,
            last_used: Instant::now(),
        })
    }

    fn with_session<R>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut UserSession) -> R,
    ) -> Result<R> {
        let mut sessions = self.inner.lock().expect("sessions lock poisoned");
        if !sessions.contains_key(user_id) {
            let session = self.load(user_id)?;
            sessions.insert(user_id.to_string(), session);
        }
        let session = sessions
            .get_mut(user_id)
            .ok_or_else(|| anyhow::anyhow!("Session vanished for {}", user_id))?;
        session.last_used = Instant::now();
        Ok(f(session))
    }

    /// Run a read-only operation against a user's state.
    pub fn read<R>(&self, user_id: &str, f: impl FnOnce(&StateStore) -> R) -> Result<R> {
        self.with_session(user_id, |session| f(&session.store))
    }

    /// Run a mutation and schedule a write if it changed anything.
    pub fn update<R>(&self, user_id: &str, f: impl FnOnce(&mut StateStore) -> R) -> Result<R> {
        self.with_session(user_id, |session| {
            let before = session.store.snapshot();
            let result = f(&mut session.store);
            if session.store.state() != &before {
                session.writer.schedule(session.store.snapshot());
            }
            result
        })
    }

    /// Forget a user's live state. A pending write is cancelled, not flushed.
    pub fn sign_out(&self, user_id: &str) -> bool {
        let removed = self
            .inner
            .lock()
            .expect("sessions lock poisoned")
            .remove(user_id);
        match removed {
            Some(session) => {
                session.writer.cancel();
                tracing::info!("Signed out {}", user_id);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.inner
            .lock()
            .expect("sessions lock poisoned")
            .contains_key(user_id)
    }

    /// Write a user's pending snapshot now.
    pub async fn flush(&self, user_id: &str) {
        let writer = self
            .inner
            .lock()
            .expect("sessions lock poisoned")
            .get(user_id)
            .map(|s| Arc::clone(&s.writer));
        if let Some(writer) = writer {
            writer.flush().await;
        }
    }

    /// Drop sessions unused for at least `idle`, writing their pending
    /// snapshots first. Returns how many were dropped.
    ///
    /// A session touched while its snapshot is being written stays live.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let candidates: Vec<(String, Instant, Arc<DebouncedWriter>)> = self
            .inner
            .lock()
            .expect("sessions lock poisoned")
            .iter()
            .filter(|(_, s)| s.last_used.elapsed() >= idle)
            .map(|(id, s)| (id.clone(), s.last_used, Arc::clone(&s.writer)))
            .collect();

        for (_, _, writer) in &candidates {
            writer.flush().await;
        }

        let mut sessions = self.inner.lock().expect("sessions lock poisoned");
        let mut evicted = 0;
        for (user_id, last_used, _) in candidates {
            if sessions.get(&user_id).is_some_and(|s| s.last_used == last_used) {
                sessions.remove(&user_id);
                tracing::debug!("Evicted idle session {}", user_id);
                evicted += 1;
            }
        }
        evicted
    }

    /// Write every pending snapshot now. Used on shutdown.
    pub async fn flush_all(&self) {
        let writers: Vec<Arc<DebouncedWriter>> = self
            .inner
            .lock()
            .expect("sessions lock poisoned")
            .values()
            .map(|s| Arc::clone(&s.writer))
            .collect();
        tracing::info!("Flushing {} session(s)", writers.len());
        for writer in writers {
            writer.flush().await;
        }
    }
}
