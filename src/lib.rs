//! # Threadloom: a checkpointed conversational workflow engine
//!
//! Threadloom runs agent workflows as directed graphs over a versioned,
//! channel-based state, with every superstep checkpointed so a conversation
//! thread can be resumed, inspected, and continued across turns.
//!
//! ## Core concepts
//!
//! - **Nodes**: async units of work that read a state snapshot and return a
//!   partial update ([`node`])
//! - **Channels**: six versioned state fields, each merged under its own
//!   reducer discipline at the superstep barrier ([`channels`], [`reducers`])
//! - **Graphs**: declarative topology with conditional routing, fan-out, and
//!   mounted sub-graphs ([`graphs`])
//! - **Runtimes**: session-managed execution with pluggable checkpoint
//!   persistence ([`runtimes`])
//! - **Assistant**: the conversational service layered on top, with
//!   per-thread memory and a fallback policy that always produces a reply
//!   ([`assistant`])
//!
//! ## Quick start
//!
//! Build a graph, compile it, and drive it to completion:
//!
//! ```
//! use threadloom::graphs::GraphBuilder;
//! use threadloom::message::Message;
//! use threadloom::node::{Node, NodeContext, NodeError, NodePartial};
//! use threadloom::state::{StateSnapshot, VersionedState};
//! use threadloom::types::NodeKind;
//! use async_trait::async_trait;
//!
//! struct GreetingNode;
//!
//! #[async_trait]
//! impl Node for GreetingNode {
//!     async fn run(
//!         &self,
//!         _snapshot: StateSnapshot,
//!         _ctx: NodeContext,
//!     ) -> Result<NodePartial, NodeError> {
//!         let greeting = Message::assistant("Hello! How can I help you today?");
//!         Ok(NodePartial::new().with_chat_history(vec![greeting]))
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let app = GraphBuilder::new()
//!     .add_node(NodeKind::Custom("greet".into()), GreetingNode)
//!     .add_edge(NodeKind::Start, NodeKind::Custom("greet".into()))
//!     .add_edge(NodeKind::Custom("greet".into()), NodeKind::End)
//!     .compile()?;
//!
//! let final_state = app
//!     .invoke(VersionedState::new_with_user_message("Human", "hi"))
//!     .await?;
//! assert_eq!(final_state.snapshot().chat_history.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## State management
//!
//! ```
//! use threadloom::state::VersionedState;
//! use serde_json::json;
//!
//! let state = VersionedState::builder()
//!     .with_user_message("Human", "what was decided yesterday?")
//!     .with_system_message("You are a meeting assistant.")
//!     .with_extra("locale", json!("en-US"))
//!     .build();
//! ```
//!
//! ## Module guide
//!
//! - [`assistant`] - the conversational service (turns, fallback policy,
//!   background transcription jobs)
//! - [`workflows`] - the prebuilt graphs the assistant runs
//! - [`nodes`] - the workflow nodes and the transcription pipeline stages
//! - [`completion`] - the structured-completion capability nodes talk to
//! - [`memory`] - thread-addressed state access and envelope rehydration
//! - [`graphs`] - workflow graph definition and compilation
//! - [`app`] / [`runtimes`] - compiled graphs, sessions, checkpointing
//! - [`state`] / [`channels`] / [`reducers`] - the versioned state model
//! - [`schedulers`] - bounded-concurrency superstep execution
//! - [`event_bus`] - run-scoped diagnostics and progress events

pub mod app;
pub mod assistant;
pub mod channels;
pub mod completion;
pub mod event_bus;
pub mod graphs;
pub mod memory;
pub mod message;
pub mod models;
pub mod node;
pub mod nodes;
pub mod reducers;
pub mod runtimes;
pub mod schedulers;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod workflows;
