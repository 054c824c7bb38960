//! Time-bounded ordered buffer.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// One timestamped value held by a [`TimeWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowNode {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Append-only buffer keeping values whose timestamps lie within `duration`
/// of the newest one.
///
/// Timestamps are non-decreasing from oldest to newest. After every append
/// `newest - oldest <= duration` holds. Every operation takes the internal
/// lock exactly once.
#[derive(Debug)]
pub struct TimeWindow {
    duration: TimeDelta,
    nodes: Mutex<VecDeque<WindowNode>>,
}

impl TimeWindow {
    /// Create an empty window spanning `duration`.
    pub fn new(duration: TimeDelta) -> Self {
        Self {
            duration,
            nodes: Mutex::new(VecDeque::new()),
        }
    }

    /// Create an empty window spanning `minutes`.
    pub fn from_minutes(minutes: i64) -> Self {
        Self::new(TimeDelta::minutes(minutes))
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<WindowNode>> {
        // A poisoned window still holds consistent nodes: every mutation is a
        // single push or pop.
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `value` at `timestamp` and evict nodes that fell out of range.
    ///
    /// A timestamp older than the newest node is clamped to it.
    ///
    /// # Returns
    /// `true` when at least one node was evicted
    pub fn append(&self, value: f64, timestamp: DateTime<Utc>) -> bool {
        let mut nodes = self.lock();
        let timestamp = match nodes.back() {
            Some(newest) if timestamp < newest.timestamp => newest.timestamp,
            _ => timestamp,
        };
        nodes.push_back(WindowNode { timestamp, value });

        let mut evicted = false;
        while let Some(oldest) = nodes.front() {
            if timestamp - oldest.timestamp <= self.duration {
                break;
            }
            nodes.pop_front();
            evicted = true;
        }
        evicted
    }

    /// Drop the oldest node. No-op on an empty window.
    pub fn remove_oldest(&self) -> bool {
        self.lock().pop_front().is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn oldest(&self) -> Option<WindowNode> {
        self.lock().front().copied()
    }

    pub fn newest(&self) -> Option<WindowNode> {
        self.lock().back().copied()
    }

    /// Run `f` over the nodes, oldest first, inside one critical section.
    pub fn with_nodes<R>(&self, f: impl FnOnce(&VecDeque<WindowNode>) -> R) -> R {
        f(&self.lock())
    }

    /// Copy of the nodes, oldest first.
    pub fn snapshot(&self) -> Vec<WindowNode> {
        self.lock().iter().copied().collect()
    }
}
