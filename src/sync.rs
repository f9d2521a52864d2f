//! Debounced write-back of user documents.
//!
//! Every mutation hands the writer a full snapshot. Snapshots that arrive
//! within the debounce delay of each other coalesce: only the last one is
//! written, once the delay has passed without a newer snapshot. A cancelled
//! writer drops its pending snapshot instead of writing it.
//!
//! Write failures are logged and otherwise ignored. The in-memory state stays
//! authoritative and the next successful write catches storage up.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

use crate::db::Database;
use crate::models::PersistedState;

/// Where debounced snapshots end up.
pub trait DocumentSink: Send + Sync + 'static {
    fn write(&self, user_id: &str, state: &PersistedState) -> Result<()>;
}

impl DocumentSink for Database {
    fn write(&self, user_id: &str, state: &PersistedState) -> Result<()> {
        self.save_state(user_id, state)
    }
}

enum Command {
    Schedule(PersistedState),
    Cancel,
    Flush(oneshot::Sender<()>),
}

/// Per-user trailing-edge debouncer. Dropping it discards any pending write.
#[derive(Debug)]
pub struct DebouncedWriter {
    tx: mpsc::UnboundedSender<Command>,
}

impl DebouncedWriter {
    /// Spawn the writer task. Must be called from within a tokio runtime.
    pub fn spawn(user_id: impl Into<String>, sink: Arc<dyn DocumentSink>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(user_id.into(), sink, delay, rx));
        Self { tx }
    }

    /// Replace the pending snapshot and restart the delay.
    pub fn schedule(&self, state: PersistedState) {
        if self.tx.send(Command::Schedule(state)).is_err() {
            tracing::warn!("Debounced writer has stopped, snapshot dropped");
        }
    }

    /// Drop the pending snapshot without writing it.
    pub fn cancel(&self) {
        let _ = self.tx.send(Command::Cancel);
    }

    /// Write the pending snapshot now, if any, and wait for it.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run(
    user_id: String,
    sink: Arc<dyn DocumentSink>,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Option<PersistedState> = None;

    loop {
        let command = if pending.is_some() {
            tokio::select! {
                command = rx.recv() => command,
                _ = tokio::time::sleep(delay) => {
                    if let Some(state) = pending.take() {
                        write(&user_id, sink.as_ref(), &state);
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(Command::Schedule(state)) => pending = Some(state),
            Some(Command::Cancel) => {
                if pending.take().is_some() {
                    tracing::debug!("Cancelled pending write for {}", user_id);
                }
            }
            Some(Command::Flush(ack)) => {
                if let Some(state) = pending.take() {
                    write(&user_id, sink.as_ref(), &state);
                }
                let _ = ack.send(());
            }
            None => {
                if pending.is_some() {
                    tracing::debug!("Writer for {} dropped with a pending write", user_id);
                }
                break;
            }
        }
    }
}

fn write(user_id: &str, sink: &dyn DocumentSink, state: &PersistedState) {
    match sink.write(user_id, state) {
        Ok(()) => tracing::debug!("Saved document for {}", user_id),
        Err(e) => tracing::warn!("Failed to save document for {}: {:#}", user_id, e),
    }
}
