//! Mounting a compiled graph as a node of a parent graph.

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::App;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::{StateSnapshot, VersionedState};

/// Projects the parent state into the sub-graph's entry state.
pub type SubgraphProjectIn =
    Arc<dyn Fn(&StateSnapshot) -> VersionedState + Send + Sync + 'static>;

/// Projects the sub-graph's final state back into a partial update for the
/// parent. Only the fields this returns flow upward; everything else the
/// sub-graph accumulated stays internal.
pub type SubgraphProjectOut =
    Arc<dyn Fn(&StateSnapshot) -> NodePartial + Send + Sync + 'static>;

/// A node that runs a fully compiled graph.
///
/// The inner graph executes inline within the parent's superstep, against the
/// parent's remaining step allowance, so a looping sub-graph cannot escape
/// the parent's recursion bound.
pub struct SubgraphNode {
    app: Arc<App>,
    project_in: SubgraphProjectIn,
    project_out: SubgraphProjectOut,
}

impl SubgraphNode {
    pub fn new(app: App, project_in: SubgraphProjectIn, project_out: SubgraphProjectOut) -> Self {
        Self {
            app: Arc::new(app),
            project_in,
            project_out,
        }
    }
}

#[async_trait]
impl Node for SubgraphNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        ctx.emit("subgraph", "entering nested graph")?;
        let entry_state = (self.project_in)(&snapshot);
        let final_state = self
            .app
            .run_inline(
                entry_state,
                ctx.event_bus_sender.clone(),
                ctx.remaining_steps,
            )
            .await
            .map_err(|e| match e {
                crate::app::AppRunError::StepLimitExceeded { allowed } => {
                    NodeError::StepLimitExceeded { allowed }
                }
                other => NodeError::ValidationFailed(other.to_string()),
            })?;
        Ok((self.project_out)(&final_state.snapshot()))
    }
}
