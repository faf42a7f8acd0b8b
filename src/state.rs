//! Versioned workflow state.
//!
//! [`VersionedState`] carries every field a conversation thread accumulates:
//! the durable chat history, the per-run agent trace, remaining tasks,
//! collected task data, the scalar control map, and the error ledger. Each
//! field is an independent versioned channel; [`StateSnapshot`] is the
//! read-only view handed to nodes.
//!
//! # Examples
//!
//! ```
//! use threadloom::state::VersionedState;
//! use threadloom::channels::Channel;
//! use serde_json::json;
//!
//! let mut state = VersionedState::new_with_user_message("Human", "Hello!");
//! state.extra.get_mut().insert("next".to_string(), json!("intent_seeker"));
//!
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.chat_history.len(), 1);
//! assert_eq!(snapshot.extra.get("next"), Some(&json!("intent_seeker")));
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{
    channels::{
        Channel, ChatHistoryChannel, CollectedChannel, ErrorsChannel, ExtrasChannel, TasksChannel,
        TraceChannel, errors::ErrorEvent,
    },
    message::Message,
    models::{CollectedData, Intention, TaskItem},
    types::ChannelType,
};

/// Keys of the scalar control fields kept in the extra channel.
pub mod keys {
    /// Name of the next specialist node chosen by the orchestrator.
    pub const NEXT: &str = "next";
    /// Classified intention label for the current turn.
    pub const CURRENT_INTENTION: &str = "current_intention";
    /// Reformulated user inquiry for the current turn.
    pub const CURRENT_INQUIRY: &str = "current_inquiry";
    /// The task assignment currently being worked.
    pub const CURRENT_TASK: &str = "current_task";
    /// The single planned task a fan-out branch carries into the task
    /// runner. Lives only in branch overlays, never in durable state.
    pub const PENDING_TASK: &str = "pending_task";
    /// Transcription payload loaded by the background pipeline.
    pub const TRANSCRIPTION_DATA: &str = "transcription_data";
    /// Analyzer stage output.
    pub const ANALYSIS: &str = "analysis";
    /// Insight-extraction stage output.
    pub const INSIGHTS: &str = "insights";
}

/// The state container for workflow execution.
///
/// Six channels, each with its own reducer discipline (see
/// [`crate::reducers`]): `chat_history` and `messages` append, `tasks` and
/// `collected` reset on an explicitly empty update, `extra` merges
/// last-writer-wins per key, `errors` appends.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct VersionedState {
    /// Durable conversation history, append-only across the thread's life.
    pub chat_history: ChatHistoryChannel,
    /// Per-run agent trace messages.
    pub messages: TraceChannel,
    /// Remaining planned tasks.
    pub tasks: TasksChannel,
    /// Data gathered for tasks.
    pub collected: CollectedChannel,
    /// Scalar control fields and transcription payloads.
    pub extra: ExtrasChannel,
    /// Structured error ledger.
    pub errors: ErrorsChannel,
}

/// Immutable view of state at a point in time, handed to nodes.
///
/// Snapshots are cloned data: a node can read them freely while the barrier
/// mutates the underlying state for other branches.
#[derive(Clone, Debug, Default)]
pub struct StateSnapshot {
    pub chat_history: Vec<Message>,
    pub chat_history_version: u32,
    pub messages: Vec<Message>,
    pub messages_version: u32,
    pub tasks: Vec<TaskItem>,
    pub tasks_version: u32,
    pub collected: Vec<CollectedData>,
    pub collected_version: u32,
    pub extra: FxHashMap<String, Value>,
    pub extra_version: u32,
    pub errors: Vec<ErrorEvent>,
    pub errors_version: u32,
}

impl StateSnapshot {
    /// The last `n` chat-history entries, oldest first. Prompt windows for
    /// the conversational nodes are built from these.
    #[must_use]
    pub fn history_window(&self, n: usize) -> &[Message] {
        let start = self.chat_history.len().saturating_sub(n);
        &self.chat_history[start..]
    }

    /// The last chat-history entry, used as the final reply of a run.
    #[must_use]
    pub fn last_chat_message(&self) -> Option<&Message> {
        self.chat_history.last()
    }

    /// A string-valued control field from the extra map.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// The classified intention for the current turn, if set.
    #[must_use]
    pub fn current_intention(&self) -> Option<Intention> {
        self.extra_str(keys::CURRENT_INTENTION).map(Intention::parse)
    }

    /// Version of one channel in this snapshot.
    #[must_use]
    pub fn version_of(&self, channel: ChannelType) -> u32 {
        match channel {
            ChannelType::ChatHistory => self.chat_history_version,
            ChannelType::Trace => self.messages_version,
            ChannelType::Tasks => self.tasks_version,
            ChannelType::Collected => self.collected_version,
            ChannelType::Extra => self.extra_version,
            ChannelType::Error => self.errors_version,
        }
    }
}

impl VersionedState {
    /// Creates a state seeded with a named user message in the chat history.
    ///
    /// This is the entry constructor for a brand-new thread: one history
    /// entry, everything else empty, all channels at version 1.
    pub fn new_with_user_message(author: &str, user_text: &str) -> Self {
        Self {
            chat_history: ChatHistoryChannel::new(vec![Message::human(author, user_text)], 1),
            ..Default::default()
        }
    }

    /// Creates a state from an existing chat history, used when a thread is
    /// rehydrated from its checkpoint.
    pub fn new_with_chat_history(history: Vec<Message>) -> Self {
        Self {
            chat_history: ChatHistoryChannel::new(history, 1),
            ..Default::default()
        }
    }

    /// Builder for states with several pre-set fields.
    ///
    /// ```
    /// use threadloom::state::VersionedState;
    /// use serde_json::json;
    ///
    /// let state = VersionedState::builder()
    ///     .with_user_message("Human", "hello")
    ///     .with_extra("next", json!("intent_seeker"))
    ///     .build();
    /// assert_eq!(state.snapshot().chat_history.len(), 1);
    /// ```
    pub fn builder() -> VersionedStateBuilder {
        VersionedStateBuilder::new()
    }

    /// Appends a chat-history entry in place. Versions are untouched; bumps
    /// belong to the barrier.
    pub fn push_chat_message(&mut self, message: Message) -> &mut Self {
        self.chat_history.get_mut().push(message);
        self
    }

    /// Inserts a key into the extra map in place.
    pub fn add_extra(&mut self, key: &str, value: Value) -> &mut Self {
        self.extra.get_mut().insert(key.to_string(), value);
        self
    }

    /// Clones the current channel payloads and versions into a snapshot.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            chat_history: self.chat_history.snapshot(),
            chat_history_version: self.chat_history.version(),
            messages: self.messages.snapshot(),
            messages_version: self.messages.version(),
            tasks: self.tasks.snapshot(),
            tasks_version: self.tasks.version(),
            collected: self.collected.snapshot(),
            collected_version: self.collected.version(),
            extra: self.extra.snapshot(),
            extra_version: self.extra.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
        }
    }

    /// True when every channel is empty: the state of a thread that has
    /// never run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chat_history.is_empty()
            && self.messages.is_empty()
            && self.tasks.is_empty()
            && self.collected.is_empty()
            && self.extra.is_empty()
            && self.errors.is_empty()
    }
}

/// Fluent builder for [`VersionedState`].
#[derive(Debug, Default)]
pub struct VersionedStateBuilder {
    chat_history: Vec<Message>,
    tasks: Vec<TaskItem>,
    collected: Vec<CollectedData>,
    extra: FxHashMap<String, Value>,
}

impl VersionedStateBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Adds a named user message to the chat history.
    pub fn with_user_message(mut self, author: &str, content: &str) -> Self {
        self.chat_history.push(Message::human(author, content));
        self
    }

    /// Adds a named agent message to the chat history.
    pub fn with_agent_message(mut self, author: &str, content: &str) -> Self {
        self.chat_history.push(Message::agent(author, content));
        self
    }

    /// Adds a system message to the chat history.
    pub fn with_system_message(mut self, content: &str) -> Self {
        self.chat_history.push(Message::system(content));
        self
    }

    /// Adds an existing message to the chat history.
    pub fn with_message(mut self, message: Message) -> Self {
        self.chat_history.push(message);
        self
    }

    /// Seeds the remaining-tasks channel.
    pub fn with_task(mut self, task: TaskItem) -> Self {
        self.tasks.push(task);
        self
    }

    /// Seeds the collected-data channel.
    pub fn with_collected(mut self, data: CollectedData) -> Self {
        self.collected.push(data);
        self
    }

    /// Sets a key in the extra map.
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Builds the state with all channels at version 1.
    pub fn build(self) -> VersionedState {
        VersionedState {
            chat_history: ChatHistoryChannel::new(self.chat_history, 1),
            messages: TraceChannel::default(),
            tasks: TasksChannel::new(self.tasks, 1),
            collected: CollectedChannel::new(self.collected, 1),
            extra: ExtrasChannel::new(self.extra, 1),
            errors: ErrorsChannel::default(),
        }
    }
}
