//! The assistant's workflow nodes.
//!
//! Conversational nodes (intent seeker, planner, task orchestrator, data
//! collector, touchpoint) each own one reasoning step of the default
//! workflow and talk to the model through the
//! [`Completion`](crate::completion::Completion) capability. The
//! [`processing`] submodule holds the unattended transcription pipeline
//! stages, which swallow their own failures into trace messages instead of
//! aborting the run.

pub mod data_collector;
pub mod intent_seeker;
pub mod planner;
pub mod processing;
pub mod task_orchestrator;
pub mod touchpoint;

pub use data_collector::DataCollectorNode;
pub use intent_seeker::IntentSeekerNode;
pub use planner::PlannerNode;
pub use task_orchestrator::TaskOrchestratorNode;
pub use touchpoint::TouchpointNode;

use crate::message::Message;

/// Renders a history window as one transcript block for a prompt.
pub(crate) fn transcript(window: &[Message]) -> String {
    window
        .iter()
        .map(Message::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Today's date in the form prompts expect.
pub(crate) fn current_date() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}
