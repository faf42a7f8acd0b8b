//! Task planning for the current inquiry.

use std::sync::Arc;

use async_trait::async_trait;

use super::transcript;
use crate::completion::{Completion, CompletionRequest, complete_as};
use crate::models::TaskPlan;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::{StateSnapshot, keys};

const AGENT: &str = "Planner";
const HISTORY_WINDOW: usize = 5;

const SYSTEM: &str = "You break the user's inquiry into the minimal batch \
of concrete tasks needed to answer it. An empty plan is a valid answer.";

/// Turns `current_inquiry` into the run's remaining-task list.
///
/// An empty plan is legitimate (greetings, smalltalk): the routing layer
/// sends those turns straight to answer composition.
pub struct PlannerNode {
    completion: Arc<dyn Completion>,
}

impl PlannerNode {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    fn prompt(inquiry: &str, snapshot: &StateSnapshot) -> String {
        format!(
            "Inquiry: {inquiry}\n\nRecent conversation:\n{}\n\nList the \
             tasks required to satisfy this inquiry.",
            transcript(snapshot.history_window(HISTORY_WINDOW)),
        )
    }
}

#[async_trait]
impl Node for PlannerNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let inquiry = snapshot
            .extra_str(keys::CURRENT_INQUIRY)
            .ok_or(NodeError::MissingInput {
                what: "current_inquiry",
            })?;

        let request =
            CompletionRequest::new(AGENT, SYSTEM, Self::prompt(inquiry, &snapshot), "TaskPlan");
        let plan: TaskPlan = complete_as(self.completion.as_ref(), request)
            .await
            .map_err(|e| NodeError::Completion {
                node: "planner",
                message: e.to_string(),
            })?;

        ctx.emit("plan", format!("planned {} task(s)", plan.tasks.len()))?;
        Ok(NodePartial::new().with_tasks(plan.tasks))
    }
}
