//! Node execution framework.
//!
//! A workflow step implements [`Node`]: it receives the current
//! [`StateSnapshot`] and a [`NodeContext`], does its work (usually one
//! structured-completion call), and returns a [`NodePartial`] naming only
//! the state fields it changes. The barrier owns merging.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::channels::errors::ErrorEvent;
use crate::event_bus::Event;
use crate::message::Message;
use crate::models::{CollectedData, TaskItem};
use crate::state::StateSnapshot;

/// Core trait for executable workflow steps.
///
/// Nodes are stateless and focused: each one owns a single reasoning step.
/// Fatal errors return `Err(NodeError)` and trip the fallback policy in the
/// conversational runtime; recoverable problems go into `NodePartial.errors`
/// and the run continues (the transcription pipeline works this way).
///
/// # Examples
///
/// ```rust,no_run
/// use threadloom::node::{Node, NodeContext, NodeError, NodePartial};
/// use threadloom::message::Message;
/// use threadloom::state::StateSnapshot;
/// use async_trait::async_trait;
///
/// struct EchoNode;
///
/// #[async_trait]
/// impl Node for EchoNode {
///     async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodePartial, NodeError> {
///         ctx.emit("echo", "echoing last message")?;
///         let last = snapshot
///             .last_chat_message()
///             .ok_or(NodeError::MissingInput { what: "chat_history" })?;
///         Ok(NodePartial::new().with_chat_history(vec![Message::agent("Echo", &last.content)]))
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node with the given state snapshot and context.
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError>;
}

/// Execution context passed to nodes.
///
/// Carries the node's identity and step number plus the event-bus sender so
/// steps can emit progress events traceable in the run log.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// Unique identifier for this node instance.
    pub node_id: String,
    /// Current execution step number.
    pub step: u64,
    /// Supersteps the owning run may still take. Sub-graph nodes run their
    /// inner graph within this allowance so nested steps count toward the
    /// parent's recursion bound.
    pub remaining_steps: u64,
    /// Channel for emitting events to the workflow's event system.
    pub event_bus_sender: flume::Sender<Event>,
}

impl NodeContext {
    /// Emit a node-scoped event enriched with this context's metadata.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.event_bus_sender
            .send(Event::node_message_with_meta(
                self.node_id.clone(),
                self.step,
                scope,
                message,
            ))
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }
}

/// Partial state update returned by node execution.
///
/// Every field is optional: `None` means "leave this channel alone". For the
/// reset-on-empty channels (`tasks`, `collected`) an explicit `Some(vec![])`
/// is the drain signal, so `None` and `Some(vec![])` mean different things.
#[derive(Clone, Debug, Default)]
pub struct NodePartial {
    /// Entries to append to the durable chat history.
    pub chat_history: Option<Vec<Message>>,
    /// Agent trace messages to append.
    pub messages: Option<Vec<Message>>,
    /// Remaining-tasks update (reset-on-empty).
    pub tasks: Option<Vec<TaskItem>>,
    /// Collected-data update (reset-on-empty).
    pub collected: Option<Vec<CollectedData>>,
    /// Key-value data to merge into the extra map.
    pub extra: Option<FxHashMap<String, serde_json::Value>>,
    /// Error events to append to the ledger.
    pub errors: Option<Vec<ErrorEvent>>,
}

impl NodePartial {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chat_history(mut self, entries: Vec<Message>) -> Self {
        self.chat_history = Some(entries);
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<TaskItem>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    #[must_use]
    pub fn with_collected(mut self, collected: Vec<CollectedData>) -> Self {
        self.collected = Some(collected);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: FxHashMap<String, serde_json::Value>) -> Self {
        self.extra = Some(extra);
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorEvent>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// True when no channel carries an update.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chat_history.is_none()
            && self.messages.is_none()
            && self.tasks.is_none()
            && self.collected.is_none()
            && self.extra.is_none()
            && self.errors.is_none()
    }
}

/// Errors from NodeContext methods.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    /// Event could not be sent due to event bus disconnection or capacity.
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(threadloom::node::event_bus_unavailable),
        help("The event bus may be disconnected or at capacity. Check workflow state.")
    )]
    EventBusUnavailable,
}

/// Fatal errors during node execution.
///
/// These halt the run (and, in the conversational runtime, trip the fallback
/// policy). Recoverable problems belong in `NodePartial.errors` instead.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(threadloom::node::missing_input),
        help("Check that an upstream node produced the required field.")
    )]
    MissingInput { what: &'static str },

    /// The structured-completion capability failed.
    #[error("completion error ({node}): {message}")]
    #[diagnostic(code(threadloom::node::completion))]
    Completion { node: &'static str, message: String },

    /// A nested graph exhausted the run's step allowance.
    #[error("step limit exceeded inside nested graph (allowed {allowed})")]
    #[diagnostic(
        code(threadloom::node::step_limit),
        help("The nested graph looped more than the recursion bound permits.")
    )]
    StepLimitExceeded { allowed: u64 },

    /// A persistence operation inside a node failed.
    #[error("storage error: {0}")]
    #[diagnostic(code(threadloom::node::storage))]
    Storage(String),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(threadloom::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(threadloom::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// Event bus communication error.
    #[error("event bus error: {0}")]
    #[diagnostic(code(threadloom::node::event_bus))]
    EventBus(#[from] NodeContextError),
}
