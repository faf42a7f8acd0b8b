/*!
Serde-friendly persistence models for checkpoints.

These structs are decoupled from the in-memory channel types so the wire
shape can stay stable while the runtime evolves. Conversion logic lives
here (`From` / `TryFrom` impls) so checkpointer code stays lean. No I/O
happens in this module.
*/

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    channels::{
        Channel, ChatHistoryChannel, CollectedChannel, ErrorsChannel, ExtrasChannel, TasksChannel,
        TraceChannel,
    },
    channels::errors::ErrorEvent,
    message::Message,
    models::{CollectedData, TaskItem},
    runtimes::checkpointer::Checkpoint,
    state::VersionedState,
    types::NodeKind,
};

/// A list-valued channel with its version counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedVecChannel<T> {
    pub version: u32,
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for PersistedVecChannel<T> {
    fn default() -> Self {
        Self {
            version: 1,
            items: Vec::new(),
        }
    }
}

/// A map-valued channel with its version counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedMapChannel<V> {
    pub version: u32,
    #[serde(default)]
    pub map: FxHashMap<String, V>,
}

impl<V> Default for PersistedMapChannel<V> {
    fn default() -> Self {
        Self {
            version: 1,
            map: FxHashMap::default(),
        }
    }
}

/// Complete persisted shape of the in-memory `VersionedState`.
///
/// Every field defaults so checkpoints written before a channel existed
/// still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistedState {
    #[serde(default)]
    pub chat_history: PersistedVecChannel<Message>,
    #[serde(default)]
    pub messages: PersistedVecChannel<Message>,
    #[serde(default)]
    pub tasks: PersistedVecChannel<TaskItem>,
    #[serde(default)]
    pub collected: PersistedVecChannel<CollectedData>,
    #[serde(default)]
    pub extra: PersistedMapChannel<Value>,
    #[serde(default)]
    pub errors: PersistedVecChannel<ErrorEvent>,
}

/// Wrapper for the node -> channel -> version map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PersistedVersionsSeen(pub FxHashMap<String, FxHashMap<String, u64>>);

/// Full persisted checkpoint representation; step history tables store one
/// instance of this shape per row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub session_id: String,
    pub step: u64,
    pub state: PersistedState,
    /// Frontier encoded as string vector using `NodeKind::encode()`.
    pub frontier: Vec<String>,
    pub versions_seen: PersistedVersionsSeen,
    pub concurrency_limit: usize,
    /// RFC3339 creation time (keeps `chrono::DateTime` out of the wire shape).
    pub created_at: String,
    #[serde(default)]
    pub ran_nodes: Vec<String>,
    #[serde(default)]
    pub skipped_nodes: Vec<String>,
    #[serde(default)]
    pub updated_channels: Vec<String>,
}

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("missing field: {0}")]
    #[diagnostic(
        code(threadloom::persistence::missing_field),
        help("populate the field in the persisted JSON before conversion")
    )]
    MissingField(&'static str),

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(threadloom::persistence::serde),
        help("ensure the JSON structure matches the Persisted* types")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/* ---------- VersionedState <-> PersistedState ---------- */

impl From<&VersionedState> for PersistedState {
    fn from(s: &VersionedState) -> Self {
        PersistedState {
            chat_history: PersistedVecChannel {
                version: s.chat_history.version(),
                items: s.chat_history.snapshot(),
            },
            messages: PersistedVecChannel {
                version: s.messages.version(),
                items: s.messages.snapshot(),
            },
            tasks: PersistedVecChannel {
                version: s.tasks.version(),
                items: s.tasks.snapshot(),
            },
            collected: PersistedVecChannel {
                version: s.collected.version(),
                items: s.collected.snapshot(),
            },
            extra: PersistedMapChannel {
                version: s.extra.version(),
                map: s.extra.snapshot(),
            },
            errors: PersistedVecChannel {
                version: s.errors.version(),
                items: s.errors.snapshot(),
            },
        }
    }
}

impl From<PersistedState> for VersionedState {
    fn from(p: PersistedState) -> Self {
        VersionedState {
            chat_history: ChatHistoryChannel::new(p.chat_history.items, p.chat_history.version),
            messages: TraceChannel::new(p.messages.items, p.messages.version),
            tasks: TasksChannel::new(p.tasks.items, p.tasks.version),
            collected: CollectedChannel::new(p.collected.items, p.collected.version),
            extra: ExtrasChannel::new(p.extra.map, p.extra.version),
            errors: ErrorsChannel::new(p.errors.items, p.errors.version),
        }
    }
}

/* ---------- Checkpoint <-> PersistedCheckpoint ---------- */

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            session_id: cp.session_id.clone(),
            step: cp.step,
            state: PersistedState::from(&cp.state),
            frontier: cp.frontier.iter().map(|k| k.encode()).collect(),
            versions_seen: PersistedVersionsSeen(cp.versions_seen.clone()),
            concurrency_limit: cp.concurrency_limit,
            created_at: cp.created_at.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
            ran_nodes: cp.ran_nodes.iter().map(|k| k.encode()).collect(),
            skipped_nodes: cp.skipped_nodes.iter().map(|k| k.encode()).collect(),
            updated_channels: cp.updated_channels.clone(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(p: PersistedCheckpoint) -> Self {
        // Unknown NodeKind encodings round-trip as Custom(encoded).
        let frontier: Vec<NodeKind> = p.frontier.iter().map(|s| NodeKind::decode(s)).collect();
        let ran_nodes: Vec<NodeKind> = p.ran_nodes.iter().map(|s| NodeKind::decode(s)).collect();
        let skipped_nodes: Vec<NodeKind> = p
            .skipped_nodes
            .iter()
            .map(|s| NodeKind::decode(s))
            .collect();
        let created_at = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .ok();
        Checkpoint {
            session_id: p.session_id,
            step: p.step,
            state: VersionedState::from(p.state),
            frontier,
            versions_seen: p.versions_seen.0,
            concurrency_limit: p.concurrency_limit,
            created_at,
            ran_nodes,
            skipped_nodes,
            updated_channels: p.updated_channels,
        }
    }
}
