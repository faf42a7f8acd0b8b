//! Final answer composition.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{current_date, transcript};
use crate::completion::{Completion, CompletionRequest, complete_as};
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::{StateSnapshot, keys};

const AGENT: &str = "Touchpoint";
const HISTORY_WINDOW: usize = 5;

const SYSTEM: &str = "You are the user-facing voice of the assistant. \
Answer the inquiry from the collected data and the conversation; if the \
data is thin, answer from what is available without inventing specifics.";

/// The composer's structured response.
#[derive(Debug, Deserialize)]
struct TouchpointReply {
    answer: String,
}

/// Composes the reply the user sees and appends it to the chat history.
///
/// This is also the whole of the fallback workflow: run against the full
/// accumulated state it produces a best-effort answer even when the
/// multi-node path failed, which is why it tolerates a missing inquiry
/// instead of requiring one.
pub struct TouchpointNode {
    completion: Arc<dyn Completion>,
}

impl TouchpointNode {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    fn prompt(snapshot: &StateSnapshot) -> String {
        let inquiry = snapshot
            .extra_str(keys::CURRENT_INQUIRY)
            .map(str::to_string)
            .or_else(|| {
                snapshot
                    .chat_history
                    .iter()
                    .rev()
                    .find(|m| m.has_role(Message::USER))
                    .map(|m| m.content.clone())
            })
            .unwrap_or_default();

        let collected = snapshot
            .collected
            .iter()
            .map(|c| format!("Data: {}\nNotes: {}", c.data, c.notes))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Inquiry: {inquiry}\nToday's date: {}\n\nCollected data:\n{collected}\n\n\
             Recent conversation:\n{}",
            current_date(),
            transcript(snapshot.history_window(HISTORY_WINDOW)),
        )
    }
}

#[async_trait]
impl Node for TouchpointNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let request =
            CompletionRequest::new(AGENT, SYSTEM, Self::prompt(&snapshot), "TouchpointReply");
        let reply: TouchpointReply = complete_as(self.completion.as_ref(), request)
            .await
            .map_err(|e| NodeError::Completion {
                node: "touchpoint",
                message: e.to_string(),
            })?;

        ctx.emit("compose", "composed the final answer")?;
        Ok(NodePartial::new().with_chat_history(vec![Message::agent(AGENT, &reply.answer)]))
    }
}
