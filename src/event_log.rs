//! Run event log
//!
//! Append-only record of what the runner did, in order.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: task-level and step-level variants
//! - EventLog: cheap to clone, shared append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

/// Single event in the run log
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Monotonic sequence ID
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// What happened
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // TASK LEVEL
    // ═══════════════════════════════════════════
    TaskStarted {
        task: String,
        step_count: usize,
    },
    TaskCompleted {
        task: String,
        duration_ms: u64,
    },
    TaskFailed {
        task: String,
        step: Option<usize>,
        error: String,
    },
    TaskAborted {
        task: String,
        step: usize,
    },

    // ═══════════════════════════════════════════
    // STEP LEVEL
    // ═══════════════════════════════════════════
    StepStarted {
        step: usize,
        kind: &'static str,
        description: String,
    },
    StepCompleted {
        step: usize,
        duration_ms: u64,
    },
    StepFailed {
        step: usize,
        error: String,
    },
}

/// Append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append an event, returns its ID
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };
        self.events.write().push(event);
        id
    }

    /// All events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Serialize to a pretty JSON array
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.events.read())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let log = EventLog::new();
        let a = log.emit(EventKind::StepStarted {
            step: 1,
            kind: "run",
            description: "run ls".into(),
        });
        let b = log.emit(EventKind::StepCompleted {
            step: 1,
            duration_ms: 0,
        });
        assert_eq!((a, b), (0, 1));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clones_share_storage() {
        let log = EventLog::new();
        let clone = log.clone();
        clone.emit(EventKind::TaskAborted {
            task: "clean".into(),
            step: 1,
        });
        assert_eq!(log.len(), 1);
        assert!(matches!(
            log.events()[0].kind,
            EventKind::TaskAborted { step: 1, .. }
        ));
    }

    #[test]
    fn test_json_is_tagged() {
        let log = EventLog::new();
        log.emit(EventKind::StepFailed {
            step: 4,
            error: "boom".into(),
        });
        let json = log.to_json().unwrap();
        assert!(json.contains("\"type\": \"step_failed\""));
        assert!(json.contains("\"step\": 4"));
    }
}
