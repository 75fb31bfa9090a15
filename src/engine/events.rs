//! Event log sink.
//!
//! Append-only receiver for the human-readable events a run produces.
//! Every event is kept in a bounded history (for the dashboard), fanned
//! out to live subscribers, and mirrored to `tracing`. Delivery order is
//! emission order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::types::{LogEvent, LogKind};

/// Default number of events retained for `history`.
pub const DEFAULT_HISTORY: usize = 500;

/// Buffered events per live subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

struct Inner {
    tx: broadcast::Sender<LogEvent>,
    history: Mutex<VecDeque<LogEvent>>,
    capacity: usize,
}

/// Cloneable handle to the run's event log.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Inner>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tx,
                history: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY))),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Append an event.
    pub fn emit(&self, kind: LogKind, message: impl Into<String>, txid: Option<String>) {
        let event = LogEvent::new(kind, message, txid);

        match kind {
            LogKind::Error => error!(kind = %kind, txid = ?event.txid, "{}", event.message),
            _ => info!(kind = %kind, txid = ?event.txid, "{}", event.message),
        }

        // Hold the lock across send so history and subscribers agree on order.
        let mut history = self.inner.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() == self.inner.capacity {
            history.pop_front();
        }
        history.push_back(event.clone());
        // No subscribers is fine.
        let _ = self.inner.tx.send(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogKind::Info, message, None);
    }

    pub fn success(&self, message: impl Into<String>, txid: &str) {
        self.emit(LogKind::Success, message, Some(txid.to_string()));
    }

    pub fn settled(&self, message: impl Into<String>, txid: &str) {
        self.emit(LogKind::Settled, message, Some(txid.to_string()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogKind::Error, message, None);
    }

    /// Live stream of events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.inner.tx.subscribe()
    }

    /// Up to `limit` most recent events, oldest first, optionally of one kind.
    pub fn history(&self, kind: Option<LogKind>, limit: usize) -> Vec<LogEvent> {
        let history = self.inner.history.lock().unwrap_or_else(|e| e.into_inner());
        let matching: Vec<&LogEvent> = history
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .collect();
        let start = matching.len().saturating_sub(limit);
        matching[start..].iter().map(|e| (*e).clone()).collect()
    }

    /// Count of retained events of `kind`.
    pub fn count(&self, kind: LogKind) -> usize {
        let history = self.inner.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().filter(|e| e.kind == kind).count()
    }

    /// Drop retained history (a new run starts with an empty log).
    pub fn clear(&self) {
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
