//! Observability: per-account log buffers and the sink that receives
//! log lines and session snapshots

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::mpsc;

use crate::types::SessionSnapshot;

/// Entries retained per account
pub const LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub account_id: usize,
    pub text: String,
}

impl LogEntry {
    pub fn new(account_id: usize, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            account_id,
            text: text.into(),
        }
    }
}

/// Most recent log lines of one account; the oldest entry is dropped when
/// the buffer is full.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Receiver of account activity.
///
/// Calls for one account arrive in the order the session produced them;
/// calls for different accounts may interleave. Implementations must not
/// block, they are invoked while the session state is held.
pub trait ObservabilitySink: Send + Sync + 'static {
    fn log(&self, entry: &LogEntry);
    fn snapshot(&self, snapshot: &SessionSnapshot);
}

#[derive(Debug, Clone)]
pub enum SinkEvent {
    Log(LogEntry),
    Snapshot(SessionSnapshot),
}

/// Forwards everything onto an unbounded channel for a presentation task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ObservabilitySink for ChannelSink {
    fn log(&self, entry: &LogEntry) {
        // A closed receiver just means nobody is watching any more
        let _ = self.tx.send(SinkEvent::Log(entry.clone()));
    }

    fn snapshot(&self, snapshot: &SessionSnapshot) {
        let _ = self.tx.send(SinkEvent::Snapshot(snapshot.clone()));
    }
}

/// Sink that only reports state changes to `tracing`; log lines are already
/// traced by the session itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn log(&self, _entry: &LogEntry) {}

    fn snapshot(&self, snapshot: &SessionSnapshot) {
        tracing::debug!(
            account = snapshot.account_id,
            status = %snapshot.status,
            points = snapshot.points,
            rank = snapshot.rank,
            countdown = %snapshot.countdown(),
            "session snapshot"
        );
    }
}
