//! The generalist data-gathering specialist.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::transcript;
use crate::completion::{Completion, CompletionRequest, complete_as};
use crate::models::CollectedData;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::StateSnapshot;

const AGENT: &str = "DataCollector";
const HISTORY_WINDOW: usize = 5;

const SYSTEM: &str = "You gather the material a task asks for, from the \
conversation and the orientations you were given, and note any caveats.";

/// The collector's structured response.
#[derive(Debug, Deserialize)]
struct CollectorReport {
    data_collected: String,
    notes: String,
}

/// Gathers data for the currently delegated task.
///
/// The orchestrator's orientations arrive as the most recent trace
/// message; the collector reads them plus a short history window and
/// appends one [`CollectedData`] entry.
pub struct DataCollectorNode {
    completion: Arc<dyn Completion>,
}

impl DataCollectorNode {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    fn prompt(snapshot: &StateSnapshot) -> String {
        let orientations = snapshot
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        format!(
            "Orientations:\n{orientations}\n\nRecent conversation:\n{}",
            transcript(snapshot.history_window(HISTORY_WINDOW)),
        )
    }
}

#[async_trait]
impl Node for DataCollectorNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let request = CompletionRequest::new(
            AGENT,
            SYSTEM,
            Self::prompt(&snapshot),
            "CollectorReport",
        );
        let report: CollectorReport = complete_as(self.completion.as_ref(), request)
            .await
            .map_err(|e| NodeError::Completion {
                node: "data_collector",
                message: e.to_string(),
            })?;

        ctx.emit("collect", "collected data for the current task")?;
        Ok(NodePartial::new().with_collected(vec![CollectedData {
            data: report.data_collected,
            notes: report.notes,
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Channel;
    use crate::completion::ScriptedCompletion;
    use crate::event_bus::Event;
    use crate::message::Message;
    use crate::state::VersionedState;
    use serde_json::json;

    // The receiver rides along so ctx.emit has a live channel to land on.
    fn ctx() -> (NodeContext, flume::Receiver<Event>) {
        let (tx, rx) = flume::unbounded();
        (
            NodeContext {
                node_id: "data_collector".into(),
                step: 4,
                remaining_steps: 21,
                event_bus_sender: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn collected_data_carries_the_report() {
        let model = Arc::new(ScriptedCompletion::new().script(
            AGENT,
            json!({"data_collected": "meeting notes text", "notes": "from last Tuesday"}),
        ));
        let node = DataCollectorNode::new(model);
        let state = VersionedState::new_with_user_message("Human", "find the notes");
        let (ctx, _rx) = ctx();

        let partial = node.run(state.snapshot(), ctx).await.unwrap();
        let collected = partial.collected.unwrap();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].data, "meeting notes text");
        assert_eq!(collected[0].notes, "from last Tuesday");
    }

    #[tokio::test]
    async fn prompt_includes_the_latest_orientations() {
        let model = Arc::new(ScriptedCompletion::new().script(
            AGENT,
            json!({"data_collected": "x", "notes": ""}),
        ));
        let node = DataCollectorNode::new(model.clone());
        let mut state = VersionedState::new_with_user_message("Human", "find the notes");
        state
            .messages
            .get_mut()
            .push(Message::agent("TaskOrchestrator", "search last Tuesday's transcription"));
        let (ctx, _rx) = ctx();

        node.run(state.snapshot(), ctx).await.unwrap();
        assert!(
            model.requests()[0]
                .prompt
                .contains("search last Tuesday's transcription")
        );
    }
}
