//! First step of every conversational turn: what does the user want?

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::transcript;
use crate::completion::{Completion, CompletionRequest, complete_as};
use crate::models::Intention;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::{StateSnapshot, keys};
use crate::utils::collections::extra_map_from;

const AGENT: &str = "IntentionSeeker";
const HISTORY_WINDOW: usize = 10;

const SYSTEM: &str = "You classify the user's latest request into one \
intention label and reformulate it as a self-contained inquiry.";

/// The classifier's structured response.
#[derive(Debug, Deserialize)]
struct IntentClassification {
    intention: String,
    inquiry: String,
}

/// Classifies the current turn into `{current_intention, current_inquiry}`.
///
/// Looks at the last ten chat-history entries so follow-up turns ("and what
/// about the second one?") resolve against recent context. Labels outside
/// the known [`Intention`] set degrade to `other` rather than failing.
pub struct IntentSeekerNode {
    completion: Arc<dyn Completion>,
}

impl IntentSeekerNode {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    fn prompt(snapshot: &StateSnapshot) -> String {
        format!(
            "Conversation so far:\n{}\n\nClassify the user's latest message \
             into one intention (greet, analyze, question, summarize, \
             extract_insights, extract_actions, find_topics, compare, \
             evaluate, other) and restate it as a standalone inquiry.",
            transcript(snapshot.history_window(HISTORY_WINDOW)),
        )
    }
}

#[async_trait]
impl Node for IntentSeekerNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let request = CompletionRequest::new(
            AGENT,
            SYSTEM,
            Self::prompt(&snapshot),
            "IntentClassification",
        );
        let out: IntentClassification = complete_as(self.completion.as_ref(), request)
            .await
            .map_err(|e| NodeError::Completion {
                node: "intent_seeker",
                message: e.to_string(),
            })?;

        let intention = Intention::parse(&out.intention);
        ctx.emit("intent", format!("classified turn as {intention}"))?;

        Ok(NodePartial::new().with_extra(extra_map_from([
            (keys::CURRENT_INTENTION, intention.label().into()),
            (keys::CURRENT_INQUIRY, out.inquiry.into()),
        ])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletion;
    use crate::event_bus::Event;
    use crate::message::Message;
    use crate::state::VersionedState;
    use serde_json::json;

    fn ctx() -> (NodeContext, flume::Receiver<Event>) {
        let (tx, rx) = flume::unbounded();
        (
            NodeContext {
                node_id: "intent_seeker".into(),
                step: 1,
                remaining_steps: 24,
                event_bus_sender: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn classification_lands_in_the_extra_channel() {
        let model = Arc::new(ScriptedCompletion::new().script(
            AGENT,
            json!({"intention": "question", "inquiry": "what was decided in the meeting?"}),
        ));
        let node = IntentSeekerNode::new(model);
        let state = VersionedState::new_with_user_message("Human", "so what was decided?");
        let (ctx, _rx) = ctx();

        let partial = node.run(state.snapshot(), ctx).await.unwrap();
        let extra = partial.extra.unwrap();
        assert_eq!(extra[keys::CURRENT_INTENTION], json!("question"));
        assert_eq!(
            extra[keys::CURRENT_INQUIRY],
            json!("what was decided in the meeting?")
        );
    }

    #[tokio::test]
    async fn unknown_labels_degrade_to_other() {
        let model = Arc::new(ScriptedCompletion::new().script(
            AGENT,
            json!({"intention": "negotiate", "inquiry": "haggle"}),
        ));
        let node = IntentSeekerNode::new(model);
        let state = VersionedState::new_with_user_message("Human", "let's haggle");
        let (ctx, _rx) = ctx();

        let partial = node.run(state.snapshot(), ctx).await.unwrap();
        assert_eq!(partial.extra.unwrap()[keys::CURRENT_INTENTION], json!("other"));
    }

    #[tokio::test]
    async fn prompt_carries_the_recent_history() {
        let model = Arc::new(
            ScriptedCompletion::new()
                .script(AGENT, json!({"intention": "greet", "inquiry": "hello"})),
        );
        let node = IntentSeekerNode::new(model.clone());
        let mut state = VersionedState::new_with_user_message("Human", "hello there");
        state.push_chat_message(Message::agent("Touchpoint", "hi!"));
        let (ctx, _rx) = ctx();

        node.run(state.snapshot(), ctx).await.unwrap();
        let requests = model.requests();
        assert!(requests[0].prompt.contains("hello there"));
        assert!(requests[0].prompt.contains("Touchpoint"));
    }
}
