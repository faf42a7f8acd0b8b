use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use crate::channels::errors::{ErrorEvent, ErrorScope};
use crate::channels::Channel;
use crate::event_bus::Event;
use crate::graphs::{ConditionalEdge, FanOutEdge};
use crate::message::Message;
use crate::models::{CollectedData, TaskItem};
use crate::node::{Node, NodePartial};
use crate::reducers::{ReducerError, ReducerRegistry};
use crate::runtimes::runner::RunnerError;
use crate::runtimes::{AppRunner, CheckpointerType, RuntimeConfig, SessionInit};
use crate::schedulers::{Scheduler, SchedulerError};
use crate::state::{StateSnapshot, VersionedState};
use crate::types::NodeKind;
use crate::utils::collections::new_extra_map;
use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

/// Compiled, executable workflow graph.
///
/// `App` holds the validated topology produced by
/// [`GraphBuilder::compile`](crate::graphs::GraphBuilder::compile): nodes,
/// static edges, conditional edges with their allow-lists, fan-out edges,
/// and the runtime configuration. It owns the barrier logic that merges
/// node outputs into [`VersionedState`] and the frontier logic that decides
/// which nodes run next.
///
/// # Examples
///
/// ```rust,no_run
/// use threadloom::graphs::GraphBuilder;
/// use threadloom::state::VersionedState;
/// use threadloom::types::NodeKind;
/// use threadloom::node::{Node, NodeContext, NodeError, NodePartial};
/// use async_trait::async_trait;
///
/// # struct MyNode;
/// # #[async_trait]
/// # impl Node for MyNode {
/// #     async fn run(&self, _: threadloom::state::StateSnapshot, _: NodeContext) -> Result<NodePartial, NodeError> {
/// #         Ok(NodePartial::default())
/// #     }
/// # }
/// #
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::Custom("process".into()), MyNode)
///     .add_edge(NodeKind::Start, NodeKind::Custom("process".into()))
///     .add_edge(NodeKind::Custom("process".into()), NodeKind::End)
///     .compile()?;
///
/// let initial_state = VersionedState::new_with_user_message("user", "Hello");
/// let final_state = app.invoke(initial_state).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    conditional_edges: Vec<ConditionalEdge>,
    fan_out_edges: Vec<FanOutEdge>,
    reducer_registry: ReducerRegistry,
    runtime_config: RuntimeConfig,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<String> = self.nodes.keys().map(ToString::to_string).collect();
        nodes.sort();
        f.debug_struct("App")
            .field("nodes", &nodes)
            .field("conditional_edges", &self.conditional_edges.len())
            .field("fan_out_edges", &self.fan_out_edges.len())
            .finish_non_exhaustive()
    }
}

/// A scheduled unit of work: a node plus an optional fan-out overlay.
///
/// Overlays are ephemeral per-branch deltas merged into the snapshot a node
/// sees for one superstep only. They are never persisted; durable writes go
/// through the barrier like any other output.
#[derive(Clone, Debug)]
pub struct FrontierEntry {
    pub node: NodeKind,
    pub overlay: Option<NodePartial>,
}

impl FrontierEntry {
    pub fn plain(node: NodeKind) -> Self {
        Self {
            node,
            overlay: None,
        }
    }
}

/// Result of applying node partials at a barrier.
///
/// Channel names and error events come back in a deterministic order so
/// downstream consumers (runner, checkpointers, tests) observe stable
/// behaviour across executions.
#[derive(Debug, Clone, Default)]
pub struct BarrierOutcome {
    /// Channel identifiers that were updated during the barrier.
    pub updated_channels: Vec<&'static str>,
    /// Aggregated error events emitted by nodes in the superstep.
    pub errors: Vec<ErrorEvent>,
}

/// Errors from driving a compiled graph directly (without a session runner).
#[derive(Debug, Error, Diagnostic)]
pub enum AppRunError {
    #[error("superstep limit of {allowed} exceeded")]
    #[diagnostic(
        code(threadloom::app::step_limit),
        help("raise recursion_limit on RuntimeConfig, or break the routing loop")
    )]
    StepLimitExceeded { allowed: u64 },

    #[error("conditional router on {from} returned '{target}', which is not in its allow-list")]
    #[diagnostic(
        code(threadloom::app::unmapped_route),
        help("every name a router can return must appear in the edge's allowed set")
    )]
    UnmappedRoute { from: String, target: String },

    #[error("fan-out router on {from} targeted unknown node '{target}'")]
    #[diagnostic(code(threadloom::app::unknown_fan_out_target))]
    UnknownFanOutTarget { from: String, target: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Barrier(#[from] ReducerError),
}

impl App {
    /// Internal (crate) factory to build an App while keeping nodes/edges private.
    pub(crate) fn from_parts(
        nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
        edges: FxHashMap<NodeKind, Vec<NodeKind>>,
        conditional_edges: Vec<ConditionalEdge>,
        fan_out_edges: Vec<FanOutEdge>,
        runtime_config: RuntimeConfig,
    ) -> Self {
        App {
            nodes,
            edges,
            conditional_edges,
            fan_out_edges,
            reducer_registry: ReducerRegistry::default(),
            runtime_config,
        }
    }

    /// Registered node implementations, keyed by `NodeKind`.
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeKind, Arc<dyn Node>> {
        &self.nodes
    }

    /// Static topology: source node to its unconditional successors.
    #[must_use]
    pub fn edges(&self) -> &FxHashMap<NodeKind, Vec<NodeKind>> {
        &self.edges
    }

    /// Conditional edges. Each router picks exactly one successor name,
    /// validated at runtime against the edge's allow-list.
    #[must_use]
    pub fn conditional_edges(&self) -> &[ConditionalEdge] {
        &self.conditional_edges
    }

    /// Dynamic fan-out edges. Each router returns a set of branches that run
    /// concurrently in the next superstep.
    #[must_use]
    pub fn fan_out_edges(&self) -> &[FanOutEdge] {
        &self.fan_out_edges
    }

    /// Runtime configuration the graph was compiled with.
    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    /// Execute the workflow to completion with session management and
    /// checkpointing.
    ///
    /// This is the primary entry point for standalone execution. It creates
    /// an [`AppRunner`] with the configured checkpointer and event bus,
    /// creates (or resumes) a session, and drives supersteps until the
    /// frontier reaches `End` or empties out.
    ///
    /// The session id comes from `RuntimeConfig::session_id` when set,
    /// otherwise a random one is generated, so repeated `invoke` calls
    /// against the same config resume the same thread.
    #[instrument(skip(self, initial_state), err)]
    pub async fn invoke(
        &self,
        initial_state: VersionedState,
    ) -> Result<VersionedState, RunnerError> {
        let event_bus = self.runtime_config.event_bus.build_event_bus();
        let checkpointer = self
            .runtime_config
            .checkpointer
            .clone()
            .unwrap_or(CheckpointerType::InMemory);

        let mut runner =
            AppRunner::with_options_and_bus(self.clone(), checkpointer, true, event_bus, true)
                .await?;

        let session_id = self
            .runtime_config
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let init = runner
            .create_session(session_id.clone(), initial_state)
            .await?;
        if let SessionInit::Resumed { checkpoint_step } = init {
            tracing::info!(
                session = %session_id,
                checkpoint_step,
                "resuming session from checkpoint"
            );
        }

        runner.run_until_complete(&session_id).await
    }

    /// Drive the graph to completion inside the caller's execution budget,
    /// without sessions or checkpointing.
    ///
    /// This is how mounted sub-graphs run: the parent node hands over its
    /// event bus sender and its remaining step allowance, so nested
    /// supersteps count against the parent's recursion bound. State lives
    /// entirely in `initial_state`; nothing is persisted.
    pub async fn run_inline(
        &self,
        initial_state: VersionedState,
        event_sender: flume::Sender<Event>,
        max_steps: u64,
    ) -> Result<VersionedState, AppRunError> {
        let mut state = initial_state;
        let scheduler = Scheduler::new(self.runtime_config.concurrency_limit);
        let mut frontier =
            self.compute_next_frontier(&[NodeKind::Start], &state.snapshot())?;
        let mut step: u64 = 0;

        loop {
            let runnable: Vec<FrontierEntry> = frontier
                .into_iter()
                .filter(|entry| !entry.node.is_end())
                .collect();
            if runnable.is_empty() {
                return Ok(state);
            }
            if step >= max_steps {
                return Err(AppRunError::StepLimitExceeded { allowed: max_steps });
            }
            step += 1;

            let outcome = scheduler
                .run_superstep(
                    &self.nodes,
                    &runnable,
                    state.snapshot(),
                    step,
                    max_steps - step,
                    event_sender.clone(),
                )
                .await?;

            self.apply_barrier(&mut state, &outcome.ran_nodes, outcome.outputs)
                .await?;
            frontier = self.compute_next_frontier(&outcome.ran_nodes, &state.snapshot())?;
        }
    }

    /// Compute the next frontier from the nodes that just ran.
    ///
    /// Combines, per ran node and in deterministic order:
    /// - static successors from the edge map,
    /// - the single target chosen by each matching conditional router,
    ///   validated against that edge's allow-list,
    /// - the branches produced by each matching fan-out router, carrying
    ///   their ephemeral overlays.
    ///
    /// Plain (overlay-less) duplicates are collapsed to one entry; fan-out
    /// branches are distinct work items and are never deduplicated.
    pub fn compute_next_frontier(
        &self,
        ran: &[NodeKind],
        snapshot: &StateSnapshot,
    ) -> Result<Vec<FrontierEntry>, AppRunError> {
        let mut next: Vec<FrontierEntry> = Vec::new();
        let mut seen_plain: FxHashSet<NodeKind> = FxHashSet::default();

        let mut push_plain = |next: &mut Vec<FrontierEntry>, node: NodeKind| {
            if seen_plain.insert(node.clone()) {
                next.push(FrontierEntry::plain(node));
            }
        };

        for source in ran {
            if let Some(targets) = self.edges.get(source) {
                for target in targets {
                    push_plain(&mut next, target.clone());
                }
            }

            for edge in self.conditional_edges.iter().filter(|e| e.from() == source) {
                let chosen = (edge.router())(snapshot);
                let target = edge.resolve(&chosen).ok_or_else(|| {
                    AppRunError::UnmappedRoute {
                        from: source.to_string(),
                        target: chosen.clone(),
                    }
                })?;
                tracing::debug!(from = %source, to = %target, "conditional route");
                push_plain(&mut next, target);
            }

            for edge in self.fan_out_edges.iter().filter(|e| e.from() == source) {
                let branches = (edge.router())(snapshot);
                tracing::debug!(from = %source, count = branches.len(), "fan-out");
                for branch in branches {
                    if !branch.target.is_end() && !self.nodes.contains_key(&branch.target) {
                        return Err(AppRunError::UnknownFanOutTarget {
                            from: source.to_string(),
                            target: branch.target.to_string(),
                        });
                    }
                    if branch.overlay.is_empty() {
                        push_plain(&mut next, branch.target);
                    } else {
                        next.push(FrontierEntry {
                            node: branch.target,
                            overlay: Some(branch.overlay),
                        });
                    }
                }
            }
        }

        Ok(next)
    }

    /// Merge node outputs and apply state reductions after a superstep.
    ///
    /// Outputs are merged in ran-node order before a single reducer pass:
    /// append channels concatenate, the reset-on-empty channels (tasks,
    /// collected) combine every present delta so that an all-empty round
    /// still signals a drain, and extra keys resolve last-writer-wins with
    /// keys sorted within each partial for determinism. Channel versions
    /// bump only when the merge actually changed the payload.
    #[instrument(skip(self, state, run_ids, node_partials), err)]
    pub async fn apply_barrier(
        &self,
        state: &mut VersionedState,
        run_ids: &[NodeKind],
        node_partials: Vec<NodePartial>,
    ) -> Result<BarrierOutcome, ReducerError> {
        let mut chat_all: Vec<Message> = Vec::new();
        let mut trace_all: Vec<Message> = Vec::new();
        let mut tasks_merged: Option<Vec<TaskItem>> = None;
        let mut collected_merged: Option<Vec<CollectedData>> = None;
        let mut extra_all = new_extra_map();
        let mut errors_all: Vec<ErrorEvent> = Vec::new();

        for (i, partial) in node_partials.iter().enumerate() {
            let fallback = NodeKind::Custom("?".to_string());
            let nid = run_ids.get(i).unwrap_or(&fallback);

            if let Some(ms) = &partial.chat_history
                && !ms.is_empty()
            {
                tracing::debug!(node = ?nid, count = ms.len(), "node appended chat history");
                chat_all.extend(ms.clone());
            }

            if let Some(ms) = &partial.messages
                && !ms.is_empty()
            {
                tracing::debug!(node = ?nid, count = ms.len(), "node appended trace messages");
                trace_all.extend(ms.clone());
            }

            // Some([]) is the drain signal for the reset channels, so a
            // present-but-empty delta must survive the merge.
            if let Some(tasks) = &partial.tasks {
                tasks_merged
                    .get_or_insert_with(Vec::new)
                    .extend(tasks.clone());
            }

            if let Some(collected) = &partial.collected {
                collected_merged
                    .get_or_insert_with(Vec::new)
                    .extend(collected.clone());
            }

            if let Some(extra) = &partial.extra
                && !extra.is_empty()
            {
                tracing::debug!(node = ?nid, keys = extra.len(), "node produced extra data");
                // Sort keys to keep the merged map deterministic across runs.
                let mut sorted_pairs: Vec<_> = extra.iter().collect();
                sorted_pairs.sort_by(|(left, _), (right, _)| left.cmp(right));
                for (k, v) in sorted_pairs {
                    extra_all.insert(k.clone(), v.clone());
                }
            }

            if let Some(errs) = &partial.errors
                && !errs.is_empty()
            {
                tracing::debug!(node = ?nid, count = errs.len(), "node produced errors");
                errors_all.extend(errs.clone());
            }
        }

        fn scope_sort_key(scope: &ErrorScope) -> (u8, &str, u64) {
            match scope {
                ErrorScope::Node { kind, step } => (0, kind.as_str(), *step),
                ErrorScope::Scheduler { step } => (1, "", *step),
                ErrorScope::Runner { session, step } => (2, session.as_str(), *step),
                ErrorScope::App => (3, "", 0),
            }
        }

        // Sort aggregated errors so downstream consumers observe a stable order.
        errors_all.sort_by(|a, b| {
            let key_a = scope_sort_key(&a.scope);
            let key_b = scope_sort_key(&b.scope);
            key_a
                .cmp(&key_b)
                .then_with(|| a.when.cmp(&b.when))
                .then_with(|| a.error.message.cmp(&b.error.message))
        });

        let merged_updates = NodePartial {
            chat_history: (!chat_all.is_empty()).then_some(chat_all),
            messages: (!trace_all.is_empty()).then_some(trace_all),
            tasks: tasks_merged,
            collected: collected_merged,
            extra: (!extra_all.is_empty()).then_some(extra_all),
            errors: (!errors_all.is_empty()).then(|| errors_all.clone()),
        };

        // Record before-states for version bump decisions. Append channels
        // only grow, so length comparison suffices; the reset channels and
        // the extra map need full payload comparison.
        let chat_before = state.chat_history.len();
        let trace_before = state.messages.len();
        let errors_before = state.errors.len();
        let tasks_before = state.tasks.snapshot();
        let collected_before = state.collected.snapshot();
        let extra_before = state.extra.snapshot();

        // Reducers do not bump versions; that is this barrier's job.
        self.reducer_registry.apply_all(&mut *state, &merged_updates)?;

        let mut updated: Vec<&'static str> = Vec::new();
        if state.chat_history.len() != chat_before {
            state.chat_history.bump_version();
            updated.push("chat_history");
        }
        if state.messages.len() != trace_before {
            state.messages.bump_version();
            updated.push("messages");
        }
        if state.tasks.snapshot() != tasks_before {
            state.tasks.bump_version();
            updated.push("tasks");
        }
        if state.collected.snapshot() != collected_before {
            state.collected.bump_version();
            updated.push("collected");
        }
        if state.extra.snapshot() != extra_before {
            state.extra.bump_version();
            updated.push("extra");
        }
        if state.errors.len() != errors_before {
            state.errors.bump_version();
            updated.push("errors");
        }

        if !updated.is_empty() {
            tracing::info!(
                target: "threadloom::app",
                channels = ?updated,
                "barrier updated channels"
            );
        }

        Ok(BarrierOutcome {
            updated_channels: updated,
            errors: errors_all,
        })
    }
}
