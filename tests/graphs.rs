use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use threadloom::graphs::{EdgeRouter, FanOutBranch, FanOutRouter, GraphBuilder, GraphCompileError};
use threadloom::message::Message;
use threadloom::node::{Node, NodeContext, NodeError, NodePartial};
use threadloom::state::{StateSnapshot, VersionedState};
use threadloom::types::NodeKind;
use threadloom::utils::collections::extra_map_from;

mod common;
use common::{SimpleMessageNode, state_with_user};

fn custom(id: &str) -> NodeKind {
    NodeKind::Custom(id.to_string())
}

#[test]
fn compile_rejects_a_graph_without_an_entry_edge() {
    let err = GraphBuilder::new()
        .add_node(custom("a"), SimpleMessageNode::new("a"))
        .add_edge(custom("a"), NodeKind::End)
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::NoEntryEdge));
}

#[test]
fn compile_rejects_edges_to_unregistered_nodes() {
    let err = GraphBuilder::new()
        .add_node(custom("a"), SimpleMessageNode::new("a"))
        .add_edge(NodeKind::Start, custom("a"))
        .add_edge(custom("a"), custom("ghost"))
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::UnknownNode { .. }));
}

#[test]
fn compile_rejects_conditional_allow_lists_with_unknown_targets() {
    let router: EdgeRouter = Arc::new(|_| NodeKind::end_target());
    let err = GraphBuilder::new()
        .add_node(custom("a"), SimpleMessageNode::new("a"))
        .add_edge(NodeKind::Start, custom("a"))
        .add_conditional_edge(custom("a"), router, [custom("ghost")])
        .compile()
        .unwrap_err();
    assert!(matches!(
        err,
        GraphCompileError::UnknownConditionalTarget { .. }
    ));
}

#[tokio::test]
async fn conditional_routing_follows_the_router() {
    let router: EdgeRouter = Arc::new(|snapshot: &StateSnapshot| {
        if snapshot.chat_history[0].content.contains("left") {
            custom("left").as_target()
        } else {
            custom("right").as_target()
        }
    });
    let app = GraphBuilder::new()
        .add_node(custom("fork"), SimpleMessageNode::new("fork"))
        .add_node(custom("left"), SimpleMessageNode::new("went left"))
        .add_node(custom("right"), SimpleMessageNode::new("went right"))
        .add_edge(NodeKind::Start, custom("fork"))
        .add_conditional_edge(custom("fork"), router, [custom("left"), custom("right")])
        .add_edge(custom("left"), NodeKind::End)
        .add_edge(custom("right"), NodeKind::End)
        .compile()
        .unwrap();

    let (tx, _rx) = flume::unbounded();
    let final_state = app
        .run_inline(state_with_user("go left"), tx, 10)
        .await
        .unwrap();

    common::assert_message_contains(&final_state, "went left");
    use threadloom::channels::Channel;
    let msgs = final_state.messages.snapshot();
    assert!(!msgs.iter().any(|m| m.content.contains("went right")));
}

/// Node that reports which shard its branch overlay handed it.
#[derive(Debug, Clone)]
struct ShardWorkerNode;

#[async_trait]
impl Node for ShardWorkerNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let shard = snapshot
            .extra_str("shard")
            .ok_or(NodeError::MissingInput { what: "shard" })?
            .to_string();
        Ok(NodePartial::new().with_messages(vec![Message::assistant(&format!("processed {shard}"))]))
    }
}

#[tokio::test]
async fn fan_out_branches_scatter_overlays_and_gather_once() {
    let scatter: FanOutRouter = Arc::new(|_: &StateSnapshot| {
        ["alpha", "beta", "gamma"]
            .into_iter()
            .map(|shard| {
                FanOutBranch::new(
                    custom("worker"),
                    NodePartial::new().with_extra(extra_map_from([("shard", json!(shard))])),
                )
            })
            .collect()
    });

    let app = GraphBuilder::new()
        .add_node(custom("split"), SimpleMessageNode::new("splitting"))
        .add_node(custom("worker"), ShardWorkerNode)
        .add_node(custom("gather"), SimpleMessageNode::new("gathered"))
        .add_edge(NodeKind::Start, custom("split"))
        .add_fan_out_edge(custom("split"), scatter)
        .add_edge(custom("worker"), custom("gather"))
        .add_edge(custom("gather"), NodeKind::End)
        .compile()
        .unwrap();

    let (tx, _rx) = flume::unbounded();
    let final_state = app
        .run_inline(state_with_user("shard it"), tx, 10)
        .await
        .unwrap();

    use threadloom::channels::Channel;
    let msgs = final_state.messages.snapshot();
    // Every branch saw its own overlay and their outputs merged back.
    for shard in ["alpha", "beta", "gamma"] {
        assert!(msgs.iter().any(|m| m.content == format!("processed {shard}")));
    }
    // The three worker branches collapse into a single gather run.
    let gathered = msgs.iter().filter(|m| m.content == "gathered").count();
    assert_eq!(gathered, 1);
    // Overlays are per-branch views, never durable writes.
    assert!(final_state.extra.snapshot().get("shard").is_none());
}

#[tokio::test]
async fn subgraph_steps_count_against_the_parent_budget() {
    // Inner graph that loops forever.
    let spinner = GraphBuilder::new()
        .add_node(custom("spin"), SimpleMessageNode::new("spinning"))
        .add_edge(NodeKind::Start, custom("spin"))
        .add_edge(custom("spin"), custom("spin"))
        .compile()
        .unwrap();

    let project_in = Arc::new(|snapshot: &StateSnapshot| {
        VersionedState::new_with_chat_history(snapshot.chat_history.clone())
    });
    let project_out = Arc::new(|_: &StateSnapshot| NodePartial::new());

    let app = GraphBuilder::new()
        .add_subgraph(custom("nested"), spinner, project_in, project_out)
        .add_edge(NodeKind::Start, custom("nested"))
        .add_edge(custom("nested"), NodeKind::End)
        .compile()
        .unwrap();

    let (tx, _rx) = flume::unbounded();
    let err = app
        .run_inline(state_with_user("spin it"), tx, 5)
        .await
        .unwrap_err();

    use threadloom::app::AppRunError;
    use threadloom::node::NodeError;
    use threadloom::schedulers::SchedulerError;
    match err {
        AppRunError::Scheduler(SchedulerError::NodeRun {
            source: NodeError::StepLimitExceeded { .. },
            ..
        }) => {}
        other => panic!("expected a nested step-limit failure, got {other}"),
    }
}
