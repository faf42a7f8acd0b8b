//! GraphBuilder: fluent construction of workflow graphs.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::edges::{ConditionalEdge, EdgeRouter, FanOutEdge, FanOutRouter};
use super::subgraph::{SubgraphNode, SubgraphProjectIn, SubgraphProjectOut};
use crate::app::App;
use crate::node::Node;
use crate::runtimes::RuntimeConfig;
use crate::types::NodeKind;

/// Builder for workflow graphs.
///
/// Add executable nodes, connect them with static, conditional, fan-out and
/// sub-graph edges, then [`compile`](Self::compile) into an executable
/// [`App`]. `NodeKind::Start` and `NodeKind::End` are virtual endpoints:
/// edges may reference them but they are never registered as nodes.
///
/// # Examples
///
/// ```
/// use threadloom::graphs::GraphBuilder;
/// use threadloom::types::NodeKind;
///
/// # struct MyNode;
/// # #[async_trait::async_trait]
/// # impl threadloom::node::Node for MyNode {
/// #     async fn run(&self, _: threadloom::state::StateSnapshot, _: threadloom::node::NodeContext) -> Result<threadloom::node::NodePartial, threadloom::node::NodeError> {
/// #         Ok(threadloom::node::NodePartial::default())
/// #     }
/// # }
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::Custom("step".into()), MyNode)
///     .add_edge(NodeKind::Start, NodeKind::Custom("step".into()))
///     .add_edge(NodeKind::Custom("step".into()), NodeKind::End)
///     .compile()
///     .unwrap();
/// ```
pub struct GraphBuilder {
    /// Registry of all executable nodes, keyed by identifier.
    pub nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    /// Unconditional edges defining static topology.
    pub edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    /// Conditional edges for single-successor dynamic routing.
    pub conditional_edges: Vec<ConditionalEdge>,
    /// Fan-out edges for scatter/gather dispatch.
    pub fan_out_edges: Vec<FanOutEdge>,
    /// Runtime configuration for the compiled application.
    pub runtime_config: RuntimeConfig,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Creates a new, empty graph builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            conditional_edges: Vec::new(),
            fan_out_edges: Vec::new(),
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Registers an executable node.
    ///
    /// `Start`/`End` are virtual; attempts to register them are ignored with
    /// a warning.
    #[must_use]
    pub fn add_node(mut self, id: NodeKind, node: impl Node + 'static) -> Self {
        match id {
            NodeKind::Start | NodeKind::End => {
                tracing::warn!(?id, "ignoring registration of virtual node kind");
            }
            _ => {
                self.nodes.insert(id, Arc::new(node));
            }
        }
        self
    }

    /// Adds an unconditional edge `from -> to`.
    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.entry(from).or_default().push(to);
        self
    }

    /// Adds a conditional edge: after `from` completes, `router` inspects
    /// the merged state and names exactly one successor out of `allowed`.
    /// A name outside the allow-list fails the step as a programming error.
    #[must_use]
    pub fn add_conditional_edge(
        mut self,
        from: NodeKind,
        router: EdgeRouter,
        allowed: impl IntoIterator<Item = NodeKind>,
    ) -> Self {
        self.conditional_edges
            .push(ConditionalEdge::new(from, router, allowed));
        self
    }

    /// Adds a dynamic fan-out edge: after `from` completes, `router` returns
    /// a set of `(successor, state slice)` branches executed with bounded
    /// parallelism and merged back through the channel reducers.
    #[must_use]
    pub fn add_fan_out_edge(mut self, from: NodeKind, router: FanOutRouter) -> Self {
        self.fan_out_edges.push(FanOutEdge::new(from, router));
        self
    }

    /// Mounts a compiled graph as a node of this graph.
    ///
    /// `project_in` builds the sub-graph's entry state from the parent
    /// snapshot; `project_out` turns the sub-graph's final state into the
    /// partial update the parent merges.
    #[must_use]
    pub fn add_subgraph(
        self,
        id: NodeKind,
        app: App,
        project_in: SubgraphProjectIn,
        project_out: SubgraphProjectOut,
    ) -> Self {
        self.add_node(id, SubgraphNode::new(app, project_in, project_out))
    }

    /// Sets runtime configuration for the compiled application.
    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        FxHashMap<NodeKind, Arc<dyn Node>>,
        FxHashMap<NodeKind, Vec<NodeKind>>,
        Vec<ConditionalEdge>,
        Vec<FanOutEdge>,
        RuntimeConfig,
    ) {
        (
            self.nodes,
            self.edges,
            self.conditional_edges,
            self.fan_out_edges,
            self.runtime_config,
        )
    }
}
