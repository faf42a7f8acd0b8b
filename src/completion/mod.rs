//! The structured-completion capability used by reasoning nodes.
//!
//! The engine never talks to a model provider directly. Nodes depend on the
//! [`Completion`] trait: hand over a prompt, get back a JSON value shaped
//! like the schema the node asked for, and decode it with
//! [`complete_as`]. Production wires in a real client; tests wire in
//! [`ScriptedCompletion`] and stay deterministic.
//!
//! No timeout wraps a completion call; a hung provider stalls that thread's
//! run until the caller gives up.

use miette::Diagnostic;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;

/// One structured-completion request.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// Name of the agent making the request, for logging and scripting.
    pub agent: String,
    /// System instructions for this agent's role.
    pub system: String,
    /// The prompt body, typically a transcript window plus the inquiry.
    pub prompt: String,
    /// Name of the expected response shape, e.g. `"TaskPlan"`.
    pub schema: &'static str,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(
        agent: impl Into<String>,
        system: impl Into<String>,
        prompt: impl Into<String>,
        schema: &'static str,
    ) -> Self {
        Self {
            agent: agent.into(),
            system: system.into(),
            prompt: prompt.into(),
            schema,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CompletionError {
    #[error("completion provider failed for {agent}: {message}")]
    #[diagnostic(code(threadloom::completion::provider))]
    Provider { agent: String, message: String },

    #[error("completion response for {agent} did not match the {schema} shape")]
    #[diagnostic(
        code(threadloom::completion::shape),
        help("the provider returned JSON that does not decode into the requested type")
    )]
    Shape {
        agent: String,
        schema: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("no scripted response left for {agent}")]
    #[diagnostic(code(threadloom::completion::script_exhausted))]
    ScriptExhausted { agent: String },
}

/// An opaque `complete(prompt, schema) -> JSON` capability.
#[async_trait::async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Value, CompletionError>;
}

/// Runs a completion request and decodes the response into `T`.
pub async fn complete_as<T: DeserializeOwned>(
    completion: &dyn Completion,
    request: CompletionRequest,
) -> Result<T, CompletionError> {
    let agent = request.agent.clone();
    let schema = request.schema;
    let value = completion.complete(request).await?;
    serde_json::from_value(value).map_err(|source| CompletionError::Shape {
        agent,
        schema,
        source,
    })
}

/// Deterministic completion model driven by pre-loaded responses.
///
/// Responses are queued per agent name and handed out in order. Asking on
/// behalf of an agent with an empty queue is an error, so a test fails
/// loudly when a workflow takes an unexpected route. Requests are recorded
/// for assertion.
#[derive(Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<rustc_hash::FxHashMap<String, VecDeque<Value>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `response` for the next request made by `agent`.
    pub fn script(self, agent: &str, response: Value) -> Self {
        self.scripts
            .lock()
            .entry(agent.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Every request seen so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<Value, CompletionError> {
        let agent = request.agent.clone();
        self.requests.lock().push(request);
        let response = self
            .scripts
            .lock()
            .get_mut(&agent)
            .and_then(VecDeque::pop_front);
        response.ok_or(CompletionError::ScriptExhausted { agent })
    }
}
