//! Prebuilt workflow graphs for the assistant.
//!
//! Three graphs cover the product surface:
//!
//! - [`conversational_workflow`]: classify the inquiry, plan tasks, scatter
//!   them across task-runner sub-graph dispatches, then compose the reply
//!   once the results have gathered.
//! - [`fallback_workflow`]: a single touchpoint node, used when the main
//!   graph dies so the user still gets an answer from whatever state
//!   survived.
//! - [`transcription_workflow`]: the linear unattended pipeline that turns a
//!   raw transcription payload into stored analysis results.

use std::sync::Arc;

use crate::app::App;
use crate::channels::Channel;
use crate::completion::Completion;
use crate::graphs::{
    EdgeRouter, FanOutBranch, FanOutRouter, GraphBuilder, GraphCompileError, SubgraphProjectIn,
    SubgraphProjectOut,
};
use crate::models::{Intention, TaskItem};
use crate::node::NodePartial;
use crate::nodes::processing::{
    AnalyzerNode, InsightExtractorNode, PersisterNode, ResultsSink, TranscriptionLoaderNode,
};
use crate::nodes::{
    DataCollectorNode, IntentSeekerNode, PlannerNode, TaskOrchestratorNode, TouchpointNode,
};
use crate::runtimes::RuntimeConfig;
use crate::state::{StateSnapshot, VersionedState, keys};
use crate::types::NodeKind;
use crate::utils::collections::{extra_map_from, new_extra_map};

pub const INTENT_SEEKER: &str = "intent_seeker";
pub const PLANNER: &str = "planner";
pub const TASK_RUNNER: &str = "task_runner";
pub const TASK_ORCHESTRATOR: &str = "task_orchestrator";
pub const DATA_COLLECTOR: &str = "data_collector";
pub const TOUCHPOINT: &str = "touchpoint";
pub const LOAD_TRANSCRIPTION: &str = "load_transcription";
pub const ANALYZE_CONTENT: &str = "analyze_content";
pub const EXTRACT_INSIGHTS: &str = "extract_insights";
pub const PERSIST_RESULTS: &str = "persist_results";

fn custom(id: &str) -> NodeKind {
    NodeKind::Custom(id.to_string())
}

/// The task-runner sub-graph: orchestrate the dispatched task, hand it to
/// the chosen collector, end.
///
/// The sub-run starts with the parent's chat history and extras but empty
/// trace and collected channels, so everything it produces there comes back
/// to the parent as new data. Its task list holds only the single task the
/// fan-out branch carried in.
fn task_runner_graph(
    completion: Arc<dyn Completion>,
    config: RuntimeConfig,
) -> Result<App, GraphCompileError> {
    let route_dispatch: EdgeRouter = Arc::new(|snapshot: &StateSnapshot| {
        match snapshot.extra_str(keys::NEXT) {
            // The orchestrator names agents; the roster has one collector.
            Some(name)
                if name.eq_ignore_ascii_case("datacollector")
                    || name.eq_ignore_ascii_case(DATA_COLLECTOR) =>
            {
                custom(DATA_COLLECTOR).as_target()
            }
            Some(other) => other.to_string(),
            None => custom(DATA_COLLECTOR).as_target(),
        }
    });

    GraphBuilder::new()
        .add_node(custom(TASK_ORCHESTRATOR), TaskOrchestratorNode::new(completion.clone()))
        .add_node(custom(DATA_COLLECTOR), DataCollectorNode::new(completion))
        .add_edge(NodeKind::Start, custom(TASK_ORCHESTRATOR))
        .add_conditional_edge(custom(TASK_ORCHESTRATOR), route_dispatch, [custom(DATA_COLLECTOR)])
        .add_edge(custom(DATA_COLLECTOR), NodeKind::End)
        .with_runtime_config(config)
        .compile()
}

fn task_runner_project_in() -> SubgraphProjectIn {
    Arc::new(|snapshot: &StateSnapshot| {
        let mut state = VersionedState::new_with_chat_history(snapshot.chat_history.clone());
        // The branch overlay names the one task this dispatch owns; a
        // snapshot without it (direct sub-graph use) keeps the full list.
        let tasks = snapshot
            .extra
            .get(keys::PENDING_TASK)
            .and_then(|v| serde_json::from_value::<TaskItem>(v.clone()).ok())
            .map(|task| vec![task])
            .unwrap_or_else(|| snapshot.tasks.clone());
        *state.tasks.get_mut() = tasks;
        *state.extra.get_mut() = snapshot.extra.clone();
        state
    })
}

fn task_runner_project_out() -> SubgraphProjectOut {
    Arc::new(|snapshot: &StateSnapshot| {
        let mut partial = NodePartial::new()
            // Always propagate tasks: the emptied list is the consumed
            // marker that clears the parent's batch once every dispatch
            // reports in.
            .with_tasks(snapshot.tasks.clone());
        if !snapshot.messages.is_empty() {
            partial = partial.with_messages(snapshot.messages.clone());
        }
        if !snapshot.collected.is_empty() {
            partial = partial.with_collected(snapshot.collected.clone());
        }
        let mut extra = new_extra_map();
        for key in [keys::NEXT, keys::CURRENT_TASK] {
            if let Some(value) = snapshot.extra.get(key) {
                extra.insert(key.to_string(), value.clone());
            }
        }
        if !extra.is_empty() {
            partial = partial.with_extra(extra);
        }
        partial
    })
}

/// The main conversational graph.
///
/// `Start -> intent_seeker -> planner`, then a fan-out: greetings and empty
/// plans take a single branch straight to the touchpoint, anything else
/// scatters one task-runner dispatch per planned task. Each dispatch owns
/// exactly one task via its branch overlay, and the consumed markers they
/// write back clear the batch in one barrier round, so the drained
/// dispatches gather at the touchpoint for the reply.
pub fn conversational_workflow(
    completion: Arc<dyn Completion>,
    config: RuntimeConfig,
) -> Result<App, GraphCompileError> {
    let inner = task_runner_graph(completion.clone(), config.clone())?;

    let scatter_tasks: FanOutRouter = Arc::new(|snapshot: &StateSnapshot| {
        let greeting = snapshot.current_intention() == Some(Intention::Greet);
        if greeting || snapshot.tasks.is_empty() {
            return vec![FanOutBranch::new(custom(TOUCHPOINT), NodePartial::new())];
        }
        snapshot
            .tasks
            .iter()
            .map(|task| {
                let overlay = NodePartial::new().with_extra(extra_map_from([(
                    keys::PENDING_TASK,
                    serde_json::to_value(task).unwrap_or_default(),
                )]));
                FanOutBranch::new(custom(TASK_RUNNER), overlay)
            })
            .collect()
    });

    GraphBuilder::new()
        .add_node(custom(INTENT_SEEKER), IntentSeekerNode::new(completion.clone()))
        .add_node(custom(PLANNER), PlannerNode::new(completion.clone()))
        .add_node(custom(TOUCHPOINT), TouchpointNode::new(completion))
        .add_subgraph(
            custom(TASK_RUNNER),
            inner,
            task_runner_project_in(),
            task_runner_project_out(),
        )
        .add_edge(NodeKind::Start, custom(INTENT_SEEKER))
        .add_edge(custom(INTENT_SEEKER), custom(PLANNER))
        .add_fan_out_edge(custom(PLANNER), scatter_tasks)
        .add_edge(custom(TASK_RUNNER), custom(TOUCHPOINT))
        .add_edge(custom(TOUCHPOINT), NodeKind::End)
        .with_runtime_config(config)
        .compile()
}

/// The degraded-mode graph: one touchpoint node answering from whatever
/// state it is given.
pub fn fallback_workflow(
    completion: Arc<dyn Completion>,
    config: RuntimeConfig,
) -> Result<App, GraphCompileError> {
    GraphBuilder::new()
        .add_node(custom(TOUCHPOINT), TouchpointNode::new(completion))
        .add_edge(NodeKind::Start, custom(TOUCHPOINT))
        .add_edge(custom(TOUCHPOINT), NodeKind::End)
        .with_runtime_config(config)
        .compile()
}

/// The unattended transcription pipeline: load, analyze, extract insights,
/// persist. Strictly linear; stages record their own failures and the run
/// always reaches the end.
pub fn transcription_workflow(
    completion: Arc<dyn Completion>,
    sink: Arc<dyn ResultsSink>,
    config: RuntimeConfig,
) -> Result<App, GraphCompileError> {
    GraphBuilder::new()
        .add_node(custom(LOAD_TRANSCRIPTION), TranscriptionLoaderNode::new())
        .add_node(custom(ANALYZE_CONTENT), AnalyzerNode::new(completion.clone()))
        .add_node(custom(EXTRACT_INSIGHTS), InsightExtractorNode::new(completion))
        .add_node(custom(PERSIST_RESULTS), PersisterNode::new(sink))
        .add_edge(NodeKind::Start, custom(LOAD_TRANSCRIPTION))
        .add_edge(custom(LOAD_TRANSCRIPTION), custom(ANALYZE_CONTENT))
        .add_edge(custom(ANALYZE_CONTENT), custom(EXTRACT_INSIGHTS))
        .add_edge(custom(EXTRACT_INSIGHTS), custom(PERSIST_RESULTS))
        .add_edge(custom(PERSIST_RESULTS), NodeKind::End)
        .with_runtime_config(config)
        .compile()
}
