//! Graph compilation: structural validation and conversion to an App.

use miette::Diagnostic;
use thiserror::Error;

use crate::app::App;
use crate::types::NodeKind;

/// Structural errors detected at compile time.
///
/// Compilation is the last point where a mis-wired workflow is a cheap
/// mistake; at step time an unknown node is a hard failure mid-run.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    /// No edge leaves the virtual Start node.
    #[error("graph has no entry edge from Start")]
    #[diagnostic(
        code(threadloom::graphs::no_entry),
        help("Add an edge from NodeKind::Start to the workflow's first node.")
    )]
    NoEntryEdge,

    /// An edge references a node that was never registered.
    #[error("edge endpoint references unregistered node: {node}")]
    #[diagnostic(
        code(threadloom::graphs::unknown_node),
        help("Register the node with add_node before wiring edges to it.")
    )]
    UnknownNode { node: NodeKind },

    /// A conditional edge's allow-list names an unregistered node.
    #[error("conditional edge from {from} allows unregistered node: {node}")]
    #[diagnostic(code(threadloom::graphs::unknown_conditional_target))]
    UnknownConditionalTarget { from: NodeKind, node: NodeKind },
}

impl super::builder::GraphBuilder {
    /// Compiles the graph into an executable application.
    ///
    /// Validates that an entry edge from Start exists, that every static
    /// edge endpoint is registered (or virtual), and that every conditional
    /// allow-list entry is registered (or `End`).
    pub fn compile(self) -> Result<App, GraphCompileError> {
        let has_entry = self.edges.contains_key(&NodeKind::Start)
            || self
                .conditional_edges
                .iter()
                .any(|e| e.from().is_start())
            || self.fan_out_edges.iter().any(|e| e.from().is_start());
        if !has_entry {
            return Err(GraphCompileError::NoEntryEdge);
        }

        let known = |kind: &NodeKind| {
            matches!(kind, NodeKind::Start | NodeKind::End) || self.nodes.contains_key(kind)
        };

        for (from, targets) in &self.edges {
            if !known(from) {
                return Err(GraphCompileError::UnknownNode { node: from.clone() });
            }
            for to in targets {
                if !known(to) {
                    return Err(GraphCompileError::UnknownNode { node: to.clone() });
                }
            }
        }

        for edge in &self.conditional_edges {
            if !known(edge.from()) {
                return Err(GraphCompileError::UnknownNode {
                    node: edge.from().clone(),
                });
            }
            for target in edge.allowed() {
                if !known(target) {
                    return Err(GraphCompileError::UnknownConditionalTarget {
                        from: edge.from().clone(),
                        node: target.clone(),
                    });
                }
            }
        }

        for edge in &self.fan_out_edges {
            if !known(edge.from()) {
                return Err(GraphCompileError::UnknownNode {
                    node: edge.from().clone(),
                });
            }
        }

        let (nodes, edges, conditional_edges, fan_out_edges, runtime_config) = self.into_parts();
        Ok(App::from_parts(
            nodes,
            edges,
            conditional_edges,
            fan_out_edges,
            runtime_config,
        ))
    }
}
