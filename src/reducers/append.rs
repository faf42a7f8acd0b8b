use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::VersionedState};

/// Appends new entries to the durable chat history. History is never
/// truncated or rewritten across the life of a thread.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AppendChatHistory;
impl Reducer for AppendChatHistory {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(new_entries) = &update.chat_history
            && !new_entries.is_empty()
        {
            state
                .chat_history
                .get_mut()
                .extend(new_entries.iter().cloned());
        }
    }
}

/// Appends per-run agent trace messages.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AppendTrace;
impl Reducer for AppendTrace {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(new_entries) = &update.messages
            && !new_entries.is_empty()
        {
            state.messages.get_mut().extend(new_entries.iter().cloned());
        }
    }
}

/// Appends error events to the ledger.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AppendErrors;
impl Reducer for AppendErrors {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(new_events) = &update.errors
            && !new_events.is_empty()
        {
            state.errors.get_mut().extend(new_events.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn chat_history_appends_in_order() {
        let mut state = VersionedState::default();
        let first = NodePartial {
            chat_history: Some(vec![Message::human("Human", "m1")]),
            ..Default::default()
        };
        let second = NodePartial {
            chat_history: Some(vec![Message::agent("Touchpoint", "m2")]),
            ..Default::default()
        };
        AppendChatHistory.apply(&mut state, &first);
        // Intervening update with no chat history leaves the channel alone.
        AppendChatHistory.apply(&mut state, &NodePartial::default());
        AppendChatHistory.apply(&mut state, &second);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.chat_history.len(), 2);
        assert_eq!(snapshot.chat_history[0].content, "m1");
        assert_eq!(snapshot.chat_history[1].content, "m2");
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let mut state = VersionedState::default();
        let update = NodePartial {
            messages: Some(vec![]),
            ..Default::default()
        };
        AppendTrace.apply(&mut state, &update);
        assert!(state.snapshot().messages.is_empty());
    }
}
