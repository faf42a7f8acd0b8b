//! Edge table entries: conditional routing and dynamic fan-out.
//!
//! Static edges live directly in the builder's adjacency map; this module
//! holds the two dynamic edge kinds. A conditional edge picks exactly one
//! successor from an explicit allow-list; a fan-out edge scatters the run
//! across several successors, each with its own state slice.

use std::sync::Arc;

use crate::node::NodePartial;
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Router for a conditional edge.
///
/// Inspects the post-merge state and returns the name of exactly one
/// successor (use [`NodeKind::as_target`] / [`NodeKind::end_target`] for the
/// strings). The returned name must be on the edge's allow-list; an unmapped
/// name is a programming error that fails the step.
///
/// # Examples
///
/// ```
/// use threadloom::graphs::EdgeRouter;
/// use threadloom::types::NodeKind;
/// use std::sync::Arc;
///
/// let after_collect: EdgeRouter = Arc::new(|snapshot| {
///     if snapshot.tasks.is_empty() {
///         NodeKind::Custom("touchpoint".into()).as_target()
///     } else {
///         NodeKind::Custom("task_orchestrator".into()).as_target()
///     }
/// });
/// ```
pub type EdgeRouter = Arc<dyn Fn(&StateSnapshot) -> String + Send + Sync + 'static>;

/// A conditional edge: router plus the explicit allow-list of legal
/// successor names.
#[derive(Clone)]
pub struct ConditionalEdge {
    from: NodeKind,
    router: EdgeRouter,
    allowed: Vec<NodeKind>,
}

impl ConditionalEdge {
    pub fn new(
        from: impl Into<NodeKind>,
        router: EdgeRouter,
        allowed: impl IntoIterator<Item = NodeKind>,
    ) -> Self {
        Self {
            from: from.into(),
            router,
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn from(&self) -> &NodeKind {
        &self.from
    }

    pub fn router(&self) -> &EdgeRouter {
        &self.router
    }

    pub fn allowed(&self) -> &[NodeKind] {
        &self.allowed
    }

    /// Resolves a routed name against the allow-list.
    pub fn resolve(&self, target: &str) -> Option<NodeKind> {
        let kind = NodeKind::from(target);
        self.allowed.iter().find(|k| **k == kind).cloned()
    }
}

/// One branch of a dynamic fan-out: the successor node and the state slice
/// it runs with. The slice is overlaid on the shared snapshot before the
/// branch executes; branch results are merged back through the ordinary
/// channel reducers.
#[derive(Clone, Debug)]
pub struct FanOutBranch {
    pub target: NodeKind,
    pub overlay: NodePartial,
}

impl FanOutBranch {
    pub fn new(target: impl Into<NodeKind>, overlay: NodePartial) -> Self {
        Self {
            target: target.into(),
            overlay,
        }
    }
}

/// Router for a fan-out edge: returns the set of parallel continuations.
/// An empty set means the edge contributes nothing this step.
pub type FanOutRouter = Arc<dyn Fn(&StateSnapshot) -> Vec<FanOutBranch> + Send + Sync + 'static>;

/// A dynamic fan-out edge.
#[derive(Clone)]
pub struct FanOutEdge {
    from: NodeKind,
    router: FanOutRouter,
}

impl FanOutEdge {
    pub fn new(from: impl Into<NodeKind>, router: FanOutRouter) -> Self {
        Self {
            from: from.into(),
            router,
        }
    }

    pub fn from(&self) -> &NodeKind {
        &self.from
    }

    pub fn router(&self) -> &FanOutRouter {
        &self.router
    }
}
