//! Core identifiers for workflow graphs and state channels.
//!
//! [`NodeKind`] names the steps of a workflow graph, with virtual `Start`
//! and `End` endpoints, and [`ChannelType`] names the state channels each
//! with its own reducer discipline. Runtime execution types (session ids,
//! step numbers) live in [`crate::runtimes`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a workflow graph.
///
/// `Start` and `End` are virtual endpoints: they are never registered as
/// executable nodes and exist only to anchor edges. Every executable step is
/// a `Custom` node named after what it does (`"intent_seeker"`,
/// `"touchpoint"`, ...).
///
/// # Persistence
///
/// Frontiers are checkpointed, so `NodeKind` has a stable string form via
/// [`encode`](Self::encode)/[`decode`](Self::decode):
///
/// ```
/// use threadloom::types::NodeKind;
///
/// let node = NodeKind::Custom("planner".to_string());
/// assert_eq!(node.encode(), "Custom:planner");
/// assert_eq!(NodeKind::decode("Custom:planner"), node);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry point. The initial frontier of every run.
    Start,
    /// Virtual terminal. A branch reaching `End` is complete.
    End,
    /// Executable step identified by a workflow-unique name.
    Custom(String),
}

impl NodeKind {
    /// Encode into the persisted string form.
    ///
    /// - `Start` → `"Start"`
    /// - `End` → `"End"`
    /// - `Custom("X")` → `"Custom:X"`
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Custom(s) => format!("Custom:{s}"),
        }
    }

    /// Decode a persisted string form. Unrecognized strings decode as
    /// `Custom` for forward compatibility.
    pub fn decode(s: &str) -> Self {
        if s == "Start" {
            NodeKind::Start
        } else if s == "End" {
            NodeKind::End
        } else if let Some(rest) = s.strip_prefix("Custom:") {
            NodeKind::Custom(rest.to_string())
        } else {
            NodeKind::Custom(s.to_string())
        }
    }

    /// Returns `true` if this is the virtual [`Start`](Self::Start) node.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    /// Returns `true` if this is the virtual [`End`](Self::End) node.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// The routing target string for this node, as returned by conditional
    /// edge routers.
    #[must_use]
    pub fn as_target(&self) -> String {
        self.to_string()
    }

    /// The routing target string for the virtual `End` node.
    #[must_use]
    pub fn end_target() -> String {
        "End".to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::End => write!(f, "End"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

// Allow string literals where a NodeKind is expected.
impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            other => NodeKind::Custom(other.to_string()),
        }
    }
}

/// Identifies a state channel. Each channel has its own merge discipline,
/// applied by the barrier via the reducer registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Durable conversation history (`Vec<Message>`), append-only across the
    /// life of the thread.
    ChatHistory,
    /// Per-run agent trace messages (`Vec<Message>`), append-only.
    Trace,
    /// Remaining planned tasks (`Vec<TaskItem>`), reset-on-empty.
    Tasks,
    /// Data gathered for tasks (`Vec<CollectedData>`), reset-on-empty.
    Collected,
    /// Scalar control fields and transcription payloads
    /// (`FxHashMap<String, Value>`), last-writer-wins per key.
    Extra,
    /// Structured error ledger (`Vec<ErrorEvent>`), append-only.
    Error,
}

impl ChannelType {
    /// All channels, in the order the barrier processes them.
    pub const ALL: [ChannelType; 6] = [
        ChannelType::ChatHistory,
        ChannelType::Trace,
        ChannelType::Tasks,
        ChannelType::Collected,
        ChannelType::Extra,
        ChannelType::Error,
    ];
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatHistory => write!(f, "chat_history"),
            Self::Trace => write!(f, "messages"),
            Self::Tasks => write!(f, "tasks"),
            Self::Collected => write!(f, "collected"),
            Self::Extra => write!(f, "extra"),
            Self::Error => write!(f, "errors"),
        }
    }
}
