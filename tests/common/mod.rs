use async_trait::async_trait;

use threadloom::message::Message;
use threadloom::node::{Node, NodeContext, NodeError, NodePartial};
use threadloom::state::{StateSnapshot, VersionedState};

#[allow(dead_code)]
pub fn state_with_user(text: &str) -> VersionedState {
    VersionedState::new_with_user_message("Human", text)
}

/// Node that appends one fixed trace message per run.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SimpleMessageNode {
    pub msg: &'static str,
}

impl SimpleMessageNode {
    #[allow(dead_code)]
    pub fn new(msg: &'static str) -> Self {
        Self { msg }
    }
}

#[async_trait]
impl Node for SimpleMessageNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        Ok(NodePartial::new().with_messages(vec![Message::assistant(self.msg)]))
    }
}

/// Node that always fails with a validation error.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct FailingNode;

#[async_trait]
impl Node for FailingNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        Err(NodeError::ValidationFailed("forced failure".into()))
    }
}

#[allow(dead_code)]
pub fn assert_message_contains(state: &VersionedState, needle: &str) {
    use threadloom::channels::Channel;
    let msgs = state.messages.snapshot();
    let found = msgs.iter().any(|m| m.content.contains(needle));
    assert!(
        found,
        "expected at least one trace message containing '{needle}', got: {msgs:?}"
    );
}
