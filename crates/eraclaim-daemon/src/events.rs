//! Event emission.
//!
//! Events are broadcast to live subscribers and kept in a bounded backlog
//! that `get_events` pages through by sequence number.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number, assigned on emit.
    #[serde(default)]
    pub sequence: u64,
    /// Event type name (e.g. "ClaimStarted", "DaemonStarted").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

impl Event {
    /// New event stamped with the current time.
    pub fn now(event_type: &str, payload: serde_json::Value) -> Self {
        Self {
            sequence: 0,
            event_type: event_type.to_string(),
            timestamp: unix_now(),
            payload,
        }
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Filter for event queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "claim", "transaction", "system".
    pub categories: Option<Vec<String>>,
    /// Only events from this signer.
    pub signer: Option<String>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
    backlog: Arc<Mutex<VecDeque<Event>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, mut event: Event) {
        event.sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
            if backlog.len() == self.capacity {
                backlog.pop_front();
            }
            backlog.push_back(event.clone());
        }
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Backlogged events after `after`, oldest first, at most `limit`.
    pub fn since(&self, after: u64, limit: usize, filter: &EventFilter) -> Vec<Event> {
        let backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
        backlog
            .iter()
            .filter(|e| e.sequence > after && filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref categories) = self.categories {
            let category = categorize_event(&event.event_type);
            if !categories.iter().any(|c| c == category) {
                return false;
            }
        }

        if let Some(ref signer) = self.signer {
            if let Some(s) = event.payload.get("signer").and_then(|v| v.as_str()) {
                if s != signer {
                    return false;
                }
            }
        }

        true
    }
}

/// Categorize an event type into a category.
fn categorize_event(event_type: &str) -> &'static str {
    match event_type {
        s if s.starts_with("Claim") => "claim",
        s if s.starts_with("Transaction") => "transaction",
        _ => "system",
    }
}
