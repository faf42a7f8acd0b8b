use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::VersionedState};

/// Reset-on-empty merge for the remaining-tasks channel.
///
/// An explicitly empty update clears the channel; a non-empty update
/// appends. `None` leaves the channel untouched. This lets a node drain a
/// batch of work by returning `Some(vec![])`.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct ResetTasks;
impl Reducer for ResetTasks {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(new_tasks) = &update.tasks {
            let channel = state.tasks.get_mut();
            if new_tasks.is_empty() {
                channel.clear();
            } else {
                channel.extend(new_tasks.iter().cloned());
            }
        }
    }
}

/// Reset-on-empty merge for the collected-data channel.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct ResetCollected;
impl Reducer for ResetCollected {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(new_data) = &update.collected {
            let channel = state.collected.get_mut();
            if new_data.is_empty() {
                channel.clear();
            } else {
                channel.extend(new_data.iter().cloned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskItem;

    fn tasks_update(tasks: Vec<TaskItem>) -> NodePartial {
        NodePartial {
            tasks: Some(tasks),
            ..Default::default()
        }
    }

    #[test]
    fn empty_update_clears_the_channel() {
        let mut state = VersionedState::default();
        ResetTasks.apply(
            &mut state,
            &tasks_update(vec![TaskItem::new("a"), TaskItem::new("b")]),
        );
        assert_eq!(state.snapshot().tasks.len(), 2);

        ResetTasks.apply(&mut state, &tasks_update(vec![]));
        assert!(state.snapshot().tasks.is_empty());

        // A later non-empty update starts fresh, not from [a, b].
        ResetTasks.apply(&mut state, &tasks_update(vec![TaskItem::new("c")]));
        let tasks = state.snapshot().tasks;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "c");
    }

    #[test]
    fn none_leaves_channel_untouched() {
        let mut state = VersionedState::default();
        ResetTasks.apply(&mut state, &tasks_update(vec![TaskItem::new("a")]));
        ResetTasks.apply(&mut state, &NodePartial::default());
        assert_eq!(state.snapshot().tasks.len(), 1);
    }
}
