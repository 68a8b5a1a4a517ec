//! Time-ordered event queue.
//!
//! Events are keyed by `(time, sequence)`, where the sequence is a monotonic
//! insertion counter, so equal timestamps pop in insertion order. The queue is
//! a `BTreeMap` rather than a heap because pending FINISHED events have to be
//! cancelled when an application's service window is extended: the key
//! returned by [`EventQueue::add`] removes that event directly.

use crate::application::AppId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a simulation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A (pre-fetched) request for the application arrives.
    Started,
    /// The application's service window ends.
    Finished,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Started => f.write_str("STARTED"),
            EventKind::Finished => f.write_str("FINISHED"),
        }
    }
}

/// An immutable scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: f64,
    pub kind: EventKind,
    pub app: AppId,
}

impl Event {
    pub fn started(time: f64, app: AppId) -> Self {
        Self {
            time,
            kind: EventKind::Started,
            app,
        }
    }

    pub fn finished(time: f64, app: AppId) -> Self {
        Self {
            time,
            kind: EventKind::Finished,
            app,
        }
    }
}

/// Handle to a pending event.
#[derive(Debug, Clone, Copy)]
pub struct EventKey {
    time: f64,
    sequence: u64,
}

impl EventKey {
    pub fn time(&self) -> f64 {
        self.time
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Pending events, earliest first.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, Event>,
    /// Sequence counter for tie-breaking.
    sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event and return its handle.
    pub fn add(&mut self, event: Event) -> EventKey {
        let key = EventKey {
            // `total_cmp` orders -0.0 before 0.0; fold it so ties stay FIFO.
            time: event.time + 0.0,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.events.insert(key, event);
        key
    }

    /// Remove and return the earliest event, or `None` once drained.
    pub fn pop_earliest(&mut self) -> Option<Event> {
        self.events.pop_first().map(|(_, event)| event)
    }

    /// Earliest pending event without removing it.
    pub fn peek(&self) -> Option<&Event> {
        self.events.values().next()
    }

    /// Cancel a pending event by handle.
    pub fn remove(&mut self, key: EventKey) -> Option<Event> {
        self.events.remove(&key)
    }

    /// Remove the earliest event matching `predicate`, if any.
    pub fn remove_matching<F>(&mut self, mut predicate: F) -> Option<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        let key = self
            .events
            .iter()
            .find(|(_, event)| predicate(event))
            .map(|(key, _)| *key)?;
        self.events.remove(&key)
    }

    /// Pending events in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
