use threadloom::channels::Channel;
use threadloom::graphs::GraphBuilder;
use threadloom::runtimes::{AppRunner, CheckpointerType, RunnerError, SessionInit};
use threadloom::types::NodeKind;

mod common;
use common::{FailingNode, SimpleMessageNode, state_with_user};

fn custom(id: &str) -> NodeKind {
    NodeKind::Custom(id.to_string())
}

fn two_step_app() -> threadloom::app::App {
    GraphBuilder::new()
        .add_node(custom("a"), SimpleMessageNode::new("step a"))
        .add_node(custom("b"), SimpleMessageNode::new("step b"))
        .add_edge(NodeKind::Start, custom("a"))
        .add_edge(custom("a"), custom("b"))
        .add_edge(custom("b"), NodeKind::End)
        .compile()
        .unwrap()
}

#[tokio::test]
async fn run_until_complete_walks_the_graph_and_checkpoints_each_step() {
    let mut runner = AppRunner::new(two_step_app(), CheckpointerType::InMemory)
        .await
        .unwrap();

    let init = runner
        .create_session("s1".into(), state_with_user("go"))
        .await
        .unwrap();
    assert_eq!(init, SessionInit::Fresh);

    let final_state = runner.run_until_complete("s1").await.unwrap();
    let msgs = final_state.messages.snapshot();
    assert_eq!(msgs.len(), 2);

    let cp = runner.checkpointer().unwrap();
    let history = cp.list_checkpoints("s1", 10).await.unwrap();
    // Initial save plus one per superstep, newest first.
    assert_eq!(
        history.iter().map(|c| c.step).collect::<Vec<_>>(),
        vec![2, 1, 0]
    );
    assert!(history[0].frontier.iter().all(NodeKind::is_end));
}

#[tokio::test]
async fn create_session_resumes_from_the_latest_checkpoint() {
    let mut runner = AppRunner::new(two_step_app(), CheckpointerType::InMemory)
        .await
        .unwrap();
    runner
        .create_session("s1".into(), state_with_user("go"))
        .await
        .unwrap();
    runner.run_step("s1").await.unwrap();

    // A second runner over the same store picks up where the first stopped.
    let cp = runner.checkpointer().unwrap();
    let mut resumed = AppRunner::with_checkpointer(
        std::sync::Arc::new(two_step_app()),
        cp,
        true,
        threadloom::runtimes::RuntimeConfig::default()
            .event_bus
            .build_event_bus(),
        false,
    );
    let init = resumed
        .create_session("s1".into(), state_with_user("ignored"))
        .await
        .unwrap();
    assert_eq!(init, SessionInit::Resumed { checkpoint_step: 1 });

    let final_state = resumed.run_until_complete("s1").await.unwrap();
    assert_eq!(final_state.messages.snapshot().len(), 2);
}

#[tokio::test]
async fn start_run_keeps_checkpoint_steps_monotonic_across_turns() {
    let mut runner = AppRunner::new(two_step_app(), CheckpointerType::InMemory)
        .await
        .unwrap();
    runner
        .create_session("s1".into(), state_with_user("first turn"))
        .await
        .unwrap();
    let first = runner.run_until_complete("s1").await.unwrap();

    // Second turn: caller-merged state, graph re-entered at Start.
    runner
        .start_run("s1".into(), first.clone())
        .await
        .unwrap();
    runner.run_until_complete("s1").await.unwrap();

    let cp = runner.checkpointer().unwrap();
    let history = cp.list_checkpoints("s1", 10).await.unwrap();
    assert_eq!(
        history.iter().map(|c| c.step).collect::<Vec<_>>(),
        vec![4, 3, 2, 1, 0]
    );
    // The second turn ran the appending node twice more.
    assert_eq!(history[0].state.messages.snapshot().len(), 4);
}

#[tokio::test]
async fn node_failure_lands_in_the_error_channel_before_the_error_returns() {
    let app = GraphBuilder::new()
        .add_node(custom("boom"), FailingNode)
        .add_edge(NodeKind::Start, custom("boom"))
        .add_edge(custom("boom"), NodeKind::End)
        .compile()
        .unwrap();
    let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await.unwrap();
    runner
        .create_session("s1".into(), state_with_user("go"))
        .await
        .unwrap();

    let err = runner.run_until_complete("s1").await.unwrap_err();
    assert!(matches!(err, RunnerError::Scheduler(_)));

    let session = runner.get_session("s1").unwrap();
    let errors = session.state.errors.snapshot();
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn looping_graph_trips_the_recursion_limit() {
    let config = threadloom::runtimes::RuntimeConfig {
        recursion_limit: 3,
        ..Default::default()
    };
    let app = GraphBuilder::new()
        .add_node(custom("spin"), SimpleMessageNode::new("spinning"))
        .add_edge(NodeKind::Start, custom("spin"))
        .add_edge(custom("spin"), custom("spin"))
        .with_runtime_config(config)
        .compile()
        .unwrap();
    let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await.unwrap();
    runner
        .create_session("s1".into(), state_with_user("go"))
        .await
        .unwrap();

    let err = runner.run_until_complete("s1").await.unwrap_err();
    assert!(matches!(err, RunnerError::StepLimitExceeded { .. }));
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let mut runner = AppRunner::new(two_step_app(), CheckpointerType::InMemory)
        .await
        .unwrap();
    let err = runner.run_step("missing").await.unwrap_err();
    assert!(matches!(err, RunnerError::SessionNotFound { .. }));
}
