//! Graph definition and compilation.
//!
//! [`GraphBuilder`] constructs a workflow as a declared node/edge table:
//! executable nodes, static edges, conditional edges with explicit successor
//! allow-lists, dynamic fan-out edges, and mounted sub-graphs. `compile()`
//! validates the structure and produces an executable
//! [`App`](crate::app::App).
//!
//! # Quick start
//!
//! ```
//! use threadloom::graphs::GraphBuilder;
//! use threadloom::types::NodeKind;
//! use threadloom::node::{Node, NodeContext, NodeError, NodePartial};
//! use threadloom::state::StateSnapshot;
//! use async_trait::async_trait;
//!
//! struct Step;
//!
//! #[async_trait]
//! impl Node for Step {
//!     async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodePartial, NodeError> {
//!         Ok(NodePartial::default())
//!     }
//! }
//!
//! let app = GraphBuilder::new()
//!     .add_node(NodeKind::Custom("step".into()), Step)
//!     .add_edge(NodeKind::Start, NodeKind::Custom("step".into()))
//!     .add_edge(NodeKind::Custom("step".into()), NodeKind::End)
//!     .compile()
//!     .unwrap();
//! ```
//!
//! # Conditional routing
//!
//! A conditional edge carries its router together with the allow-list of
//! legal targets; routing to a name outside the list fails the step rather
//! than silently falling through:
//!
//! ```
//! use threadloom::graphs::EdgeRouter;
//! use threadloom::types::NodeKind;
//! use std::sync::Arc;
//!
//! let route: EdgeRouter = Arc::new(|snapshot| {
//!     if snapshot.tasks.is_empty() {
//!         NodeKind::Custom("touchpoint".into()).as_target()
//!     } else {
//!         NodeKind::Custom("task_orchestrator".into()).as_target()
//!     }
//! });
//! # let _ = route;
//! ```

mod builder;
mod compilation;
mod edges;
mod subgraph;

pub use builder::GraphBuilder;
pub use compilation::GraphCompileError;
pub use edges::{ConditionalEdge, EdgeRouter, FanOutBranch, FanOutEdge, FanOutRouter};
pub use subgraph::{SubgraphNode, SubgraphProjectIn, SubgraphProjectOut};
