//! Delegation of a dispatched task to a specialist.

use std::sync::Arc;

use async_trait::async_trait;

use super::transcript;
use crate::completion::{Completion, CompletionRequest, complete_as};
use crate::message::Message;
use crate::models::TaskAssignment;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::{StateSnapshot, keys};
use crate::utils::collections::extra_map_from;

const AGENT: &str = "TaskOrchestrator";
const HISTORY_WINDOW: usize = 5;

const SYSTEM: &str = "You delegate one task to the best-suited specialist \
agent, stating the objective and working orientations.";

/// Delegates the pending task of the current dispatch to a specialist.
///
/// Each task-runner dispatch carries exactly one task (the fan-out layer
/// scatters the planner's batch one task per branch). The assignment's
/// orientations go into the trace channel so the specialist's prompt can
/// pick them up, and `next` names the specialist for the router.
///
/// The explicitly empty task write-back marks the task consumed: the tasks
/// channel appends non-empty updates and clears on `Some(vec![])`, so
/// writing a remainder back would duplicate it instead of draining it.
pub struct TaskOrchestratorNode {
    completion: Arc<dyn Completion>,
}

impl TaskOrchestratorNode {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    fn prompt(task: &str, snapshot: &StateSnapshot) -> String {
        format!(
            "Task to delegate: {task}\n\nRecent conversation:\n{}",
            transcript(snapshot.history_window(HISTORY_WINDOW)),
        )
    }

    fn orientations_message(assignment: &TaskAssignment) -> Message {
        Message::agent(
            AGENT,
            &format!(
                "Task: {}\nObjective: {}\nOrientations:\n{}",
                assignment.task, assignment.objective, assignment.orientations,
            ),
        )
    }
}

#[async_trait]
impl Node for TaskOrchestratorNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let Some(current) = snapshot.tasks.first() else {
            return Err(NodeError::MissingInput { what: "tasks" });
        };

        let request = CompletionRequest::new(
            AGENT,
            SYSTEM,
            Self::prompt(&current.description, &snapshot),
            "TaskAssignment",
        );
        let assignment: TaskAssignment = complete_as(self.completion.as_ref(), request)
            .await
            .map_err(|e| NodeError::Completion {
                node: "task_orchestrator",
                message: e.to_string(),
            })?;

        ctx.emit(
            "delegate",
            format!(
                "delegated '{}' to {}",
                assignment.task, assignment.chosen_agent
            ),
        )?;

        // Some(vec![]) marks the task consumed; the reset-on-empty
        // discipline clears the channel instead of appending.
        Ok(NodePartial::new()
            .with_messages(vec![Self::orientations_message(&assignment)])
            .with_tasks(vec![])
            .with_extra(extra_map_from([
                (keys::NEXT, assignment.chosen_agent.clone().into()),
                (keys::CURRENT_TASK, serde_json::to_value(&assignment)?),
            ])))
    }
}
