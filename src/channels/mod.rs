//! Versioned state channels.
//!
//! Each state field lives in its own channel: a payload plus a version
//! counter. Versions are bumped by the barrier only when a merge actually
//! changed the payload, which lets checkpoints record which channels each
//! step touched.

pub mod errors;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::message::Message;
use crate::models::{CollectedData, TaskItem};
use errors::ErrorEvent;

/// Common interface over versioned channels.
pub trait Channel {
    type Payload;

    /// Clones the current payload.
    fn snapshot(&self) -> Self::Payload;
    /// Mutable access to the payload. Does not touch the version; version
    /// bumps belong to the barrier.
    fn get_mut(&mut self) -> &mut Self::Payload;
    /// Current version counter.
    fn version(&self) -> u32;
    /// Increments the version counter. Called by the barrier after a merge
    /// that changed the payload.
    fn bump_version(&mut self);
}

/// A versioned list-valued channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VecChannel<T> {
    items: Vec<T>,
    version: u32,
}

impl<T> VecChannel<T> {
    #[must_use]
    pub fn new(items: Vec<T>, version: u32) -> Self {
        Self { items, version }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for VecChannel<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            version: 1,
        }
    }
}

impl<T: Clone> Channel for VecChannel<T> {
    type Payload = Vec<T>;

    fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    fn get_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// A versioned map-valued channel with last-writer-wins per key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapChannel<V> {
    entries: FxHashMap<String, V>,
    version: u32,
}

impl<V> MapChannel<V> {
    #[must_use]
    pub fn new(entries: FxHashMap<String, V>, version: u32) -> Self {
        Self { entries, version }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for MapChannel<V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            version: 1,
        }
    }
}

impl<V: Clone> Channel for MapChannel<V> {
    type Payload = FxHashMap<String, V>;

    fn snapshot(&self) -> FxHashMap<String, V> {
        self.entries.clone()
    }

    fn get_mut(&mut self) -> &mut FxHashMap<String, V> {
        &mut self.entries
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// Durable conversation history, append-only.
pub type ChatHistoryChannel = VecChannel<Message>;
/// Per-run agent trace messages, append-only.
pub type TraceChannel = VecChannel<Message>;
/// Remaining planned tasks, reset-on-empty.
pub type TasksChannel = VecChannel<TaskItem>;
/// Gathered task data, reset-on-empty.
pub type CollectedChannel = VecChannel<CollectedData>;
/// Scalar control fields and transcription payloads.
pub type ExtrasChannel = MapChannel<Value>;
/// Structured error ledger.
pub type ErrorsChannel = VecChannel<ErrorEvent>;
