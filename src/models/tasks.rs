use serde::{Deserialize, Serialize};

/// A single planned unit of work produced by the planner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Short description of what needs doing.
    pub description: String,
}

impl TaskItem {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// The planner's structured completion output: the batch of tasks needed to
/// satisfy the current inquiry. May be empty when no work is required.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub tasks: Vec<TaskItem>,
}

/// The task orchestrator's structured completion output: one task delegated
/// to a specialist with working orientations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// The task being delegated.
    pub task: String,
    /// What a successful outcome looks like.
    pub objective: String,
    /// Guidance for the specialist carrying out the task.
    pub orientations: String,
    /// Name of the specialist node to route to next.
    pub chosen_agent: String,
}

/// Data gathered by a specialist for one task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedData {
    /// The gathered material itself.
    pub data: String,
    /// Caveats or context on how the data was obtained.
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_plan_defaults_empty() {
        assert!(TaskPlan::default().tasks.is_empty());
    }

    #[test]
    fn assignment_round_trips() {
        let assignment = TaskAssignment {
            task: "summarize the call".into(),
            objective: "a three-line summary".into(),
            orientations: "focus on decisions".into(),
            chosen_agent: "data_collector".into(),
        };
        let json = serde_json::to_string(&assignment).expect("serialize");
        let back: TaskAssignment = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(assignment, back);
    }
}
