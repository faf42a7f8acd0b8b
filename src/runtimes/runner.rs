use crate::app::{App, AppRunError, BarrierOutcome};
use crate::channels::errors::{ErrorDetail, ErrorEvent};
use crate::event_bus::{Event, EventBus};
use crate::node::NodePartial;
use crate::reducers::ReducerError;
use crate::runtimes::checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
    restore_session_state,
};
use crate::runtimes::session::{SessionInit, SessionState, StateVersions};
use crate::schedulers::{Scheduler, SchedulerError};
use crate::state::VersionedState;
use crate::types::{ChannelType, NodeKind};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Diagnostic scope emitted on the event bus when a session run terminates.
pub const SESSION_END_SCOPE: &str = "session_end";

/// Result of executing one superstep in a session.
///
/// The embedded [`BarrierOutcome`] carries the canonical ordering of
/// updates and errors so callers can persist and resume without drift.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: u64,
    pub ran_nodes: Vec<NodeKind>,
    pub skipped_nodes: Vec<NodeKind>,
    pub barrier_outcome: BarrierOutcome,
    pub next_frontier: Vec<NodeKind>,
    pub state_versions: StateVersions,
    pub completed: bool,
}

/// Runtime execution engine for compiled graphs.
///
/// `AppRunner` wraps an [`App`] and adds the runtime environment around it:
/// isolated sessions keyed by id, checkpoint persistence after every
/// superstep, a recursion bound, and the event bus nodes emit progress to.
///
/// # App vs AppRunner
///
/// - **`App`**: the workflow graph structure (nodes, edges, topology)
/// - **`AppRunner`**: the runtime environment (sessions, events, checkpoints)
///
/// One `App` can back many runners; each runner keeps its own sessions and
/// bus. [`App::invoke`](crate::app::App::invoke) creates a runner internally
/// for one-shot execution; services that manage threads hold a runner (or
/// build one per request) themselves.
pub struct AppRunner {
    app: Arc<App>,
    sessions: FxHashMap<String, SessionState>,
    scheduler: Scheduler,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    autosave: bool,
    event_bus: EventBus,
}

#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("session not found: {session_id}")]
    #[diagnostic(code(threadloom::runner::session_not_found))]
    SessionNotFound { session_id: String },

    #[error("no nodes to run from Start (empty frontier)")]
    #[diagnostic(
        code(threadloom::runner::no_start_nodes),
        help("add an edge from Start or set the entry node correctly")
    )]
    NoStartNodes,

    #[error("session {session_id} exceeded the recursion limit of {allowed} supersteps")]
    #[diagnostic(
        code(threadloom::runner::recursion_limit),
        help("raise recursion_limit on RuntimeConfig if the workflow legitimately loops this long")
    )]
    StepLimitExceeded { session_id: String, allowed: u64 },

    #[error("postgres checkpointer requested but no database URL configured")]
    #[diagnostic(
        code(threadloom::runner::no_database_url),
        help("set DATABASE_URL or RuntimeConfig::database_url")
    )]
    NoDatabaseUrl,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpointer(#[from] CheckpointerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Barrier(#[from] ReducerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Routing(#[from] AppRunError),
}

impl AppRunner {
    /// Create a runner with the runtime-configured event bus and autosave on.
    pub async fn new(app: App, checkpointer_type: CheckpointerType) -> Result<Self, RunnerError> {
        Self::with_options(app, checkpointer_type, true).await
    }

    /// Create with explicit autosave toggle.
    pub async fn with_options(
        app: App,
        checkpointer_type: CheckpointerType,
        autosave: bool,
    ) -> Result<Self, RunnerError> {
        let bus = app.runtime_config().event_bus.build_event_bus();
        Self::with_arc_and_bus(Arc::new(app), checkpointer_type, autosave, bus, true).await
    }

    /// Create a runner with a caller-supplied event bus.
    ///
    /// Use this when events should flow to custom sinks (a memory sink in
    /// tests, a channel feeding a client connection) instead of the bus the
    /// runtime config would build.
    pub async fn with_options_and_bus(
        app: App,
        checkpointer_type: CheckpointerType,
        autosave: bool,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Result<Self, RunnerError> {
        Self::with_arc_and_bus(
            Arc::new(app),
            checkpointer_type,
            autosave,
            event_bus,
            start_listener,
        )
        .await
    }

    /// Create a runner around an existing checkpointer instance.
    ///
    /// The assistant layer shares one store between its runners and the
    /// memory manager, so every surface sees the same thread lineages.
    pub fn with_checkpointer(
        app: Arc<App>,
        checkpointer: Arc<dyn Checkpointer>,
        autosave: bool,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Self {
        if start_listener {
            event_bus.listen_for_events();
        }
        let scheduler = Scheduler::new(app.runtime_config().concurrency_limit);
        Self {
            app,
            sessions: FxHashMap::default(),
            scheduler,
            checkpointer: Some(checkpointer),
            autosave,
            event_bus,
        }
    }

    async fn with_arc_and_bus(
        app: Arc<App>,
        checkpointer_type: CheckpointerType,
        autosave: bool,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Result<Self, RunnerError> {
        let checkpointer = Self::create_checkpointer(&app, checkpointer_type).await?;
        if start_listener {
            event_bus.listen_for_events();
        }
        let scheduler = Scheduler::new(app.runtime_config().concurrency_limit);
        Ok(Self {
            app,
            sessions: FxHashMap::default(),
            scheduler,
            checkpointer: Some(checkpointer),
            autosave,
            event_bus,
        })
    }

    async fn create_checkpointer(
        #[cfg_attr(not(feature = "postgres"), allow(unused_variables))] app: &App,
        checkpointer_type: CheckpointerType,
    ) -> Result<Arc<dyn Checkpointer>, RunnerError> {
        match checkpointer_type {
            CheckpointerType::InMemory => Ok(Arc::new(InMemoryCheckpointer::new())),
            #[cfg(feature = "postgres")]
            CheckpointerType::Postgres => {
                let db_url = app
                    .runtime_config()
                    .database_url
                    .clone()
                    .or_else(|| std::env::var("DATABASE_URL").ok())
                    .ok_or(RunnerError::NoDatabaseUrl)?;
                let cp = crate::runtimes::checkpointer_postgres::PostgresCheckpointer::connect(
                    &db_url,
                )
                .await?;
                Ok(Arc::new(cp))
            }
        }
    }

    /// The checkpointer backing this runner, for callers that also need
    /// direct history access (the memory layer does).
    #[must_use]
    pub fn checkpointer(&self) -> Option<Arc<dyn Checkpointer>> {
        self.checkpointer.clone()
    }

    /// Sender side of the runner's event bus.
    #[must_use]
    pub fn event_sender(&self) -> flume::Sender<Event> {
        self.event_bus.get_sender()
    }

    /// Initialize a session, resuming from the latest checkpoint when one
    /// exists for this id.
    #[instrument(skip(self, initial_state, session_id), err)]
    pub async fn create_session(
        &mut self,
        session_id: String,
        initial_state: VersionedState,
    ) -> Result<SessionInit, RunnerError> {
        let restored_checkpoint = if let Some(cp) = &self.checkpointer {
            cp.load_latest(&session_id).await?
        } else {
            None
        };

        if let Some(stored) = restored_checkpoint {
            let restored = restore_session_state(&stored);
            self.sessions.insert(session_id, restored);
            return Ok(SessionInit::Resumed {
                checkpoint_step: stored.step,
            });
        }

        let frontier = self
            .app
            .compute_next_frontier(&[NodeKind::Start], &initial_state.snapshot())?;
        if frontier.is_empty() {
            return Err(RunnerError::NoStartNodes);
        }
        let session_state = SessionState::new(initial_state, frontier);
        self.sessions
            .insert(session_id.clone(), session_state.clone());
        if let Some(cp) = &self.checkpointer {
            let save = cp
                .save(Checkpoint::from_session(
                    &session_id,
                    &session_state,
                    self.scheduler.concurrency_limit,
                ))
                .await;
            if let Err(e) = save {
                tracing::warn!(session = %session_id, error = %e, "initial checkpoint save failed");
            }
        }
        Ok(SessionInit::Fresh)
    }

    /// Begin a new run on a session with caller-supplied state, re-entering
    /// the graph at Start regardless of any stored frontier.
    ///
    /// The memory layer uses this for follow-up turns: it merges the
    /// thread's saved history into `state` itself, so resuming the old
    /// frontier (which has already reached End) would be wrong. Stored
    /// checkpoints only contribute the step offset, keeping the lineage's
    /// step numbers monotonic across turns.
    #[instrument(skip(self, state, session_id), err)]
    pub async fn start_run(
        &mut self,
        session_id: String,
        state: VersionedState,
    ) -> Result<(), RunnerError> {
        let step_offset = if let Some(cp) = &self.checkpointer {
            cp.load_latest(&session_id).await?.map_or(0, |c| c.step)
        } else {
            0
        };

        let frontier = self
            .app
            .compute_next_frontier(&[NodeKind::Start], &state.snapshot())?;
        if frontier.is_empty() {
            return Err(RunnerError::NoStartNodes);
        }
        let mut session_state = SessionState::new(state, frontier);
        session_state.step_offset = step_offset;
        self.sessions.insert(session_id, session_state);
        Ok(())
    }

    /// Execute one superstep for the given session.
    ///
    /// On node failure the error is recorded in the session's error channel
    /// (and checkpointed when autosave is on) before the error is returned,
    /// so callers that fall back still see what went wrong in state.
    #[instrument(skip(self), err)]
    pub async fn run_step(&mut self, session_id: &str) -> Result<StepReport, RunnerError> {
        let mut session_state =
            self.sessions
                .remove(session_id)
                .ok_or_else(|| RunnerError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;

        if Self::is_complete(&session_state) {
            let report = StepReport {
                step: session_state.step,
                ran_nodes: vec![],
                skipped_nodes: session_state
                    .frontier
                    .iter()
                    .map(|e| e.node.clone())
                    .collect(),
                barrier_outcome: BarrierOutcome::default(),
                next_frontier: vec![],
                state_versions: StateVersions::of(&session_state.state),
                completed: true,
            };
            self.sessions.insert(session_id.to_string(), session_state);
            return Ok(report);
        }

        let allowed = self.app.runtime_config().recursion_limit;
        if session_state.step >= allowed {
            self.sessions.insert(session_id.to_string(), session_state);
            return Err(RunnerError::StepLimitExceeded {
                session_id: session_id.to_string(),
                allowed,
            });
        }

        let step_report = match self.run_one_superstep(&mut session_state).await {
            Ok(report) => report,
            Err(e) => {
                let event = Self::error_event(session_id, &session_state, &e);
                let partial = NodePartial {
                    errors: Some(vec![event]),
                    ..Default::default()
                };
                // Route the failure through the barrier so it lands in the
                // error channel with a proper version bump.
                let mut update_state = session_state.state.clone();
                let _ = self
                    .app
                    .apply_barrier(&mut update_state, &[], vec![partial])
                    .await;
                session_state.state = update_state;
                self.sessions.insert(session_id.to_string(), session_state);
                self.maybe_checkpoint(session_id, &[], &[], &[]).await;
                return Err(e);
            }
        };

        self.sessions.insert(session_id.to_string(), session_state);
        self.maybe_checkpoint(
            session_id,
            &step_report.ran_nodes,
            &step_report.skipped_nodes,
            &step_report.barrier_outcome.updated_channels,
        )
        .await;
        Ok(step_report)
    }

    fn error_event(session_id: &str, session_state: &SessionState, e: &RunnerError) -> ErrorEvent {
        match e {
            RunnerError::Scheduler(SchedulerError::NodeRun { node, step, source }) => {
                ErrorEvent::node(node.clone(), *step, ErrorDetail::msg(source.to_string()))
                    .with_tag("node")
            }
            RunnerError::Scheduler(source) => {
                ErrorEvent::scheduler(session_state.step, ErrorDetail::msg(source.to_string()))
                    .with_tag("scheduler")
            }
            other => ErrorEvent::runner(
                session_id,
                session_state.step,
                ErrorDetail::msg(other.to_string()),
            )
            .with_tag("runner")
            .with_context(serde_json::json!({
                "frontier": session_state
                    .frontier
                    .iter()
                    .map(|entry| entry.node.encode())
                    .collect::<Vec<_>>()
            })),
        }
    }

    #[instrument(skip(self, session_state), err)]
    async fn run_one_superstep(
        &self,
        session_state: &mut SessionState,
    ) -> Result<StepReport, RunnerError> {
        session_state.step += 1;
        let step = session_state.step;
        let allowed = self.app.runtime_config().recursion_limit;

        tracing::debug!(step, frontier = session_state.frontier.len(), "starting superstep");

        let snapshot = session_state.state.snapshot();
        let outcome = self
            .scheduler
            .run_superstep(
                self.app.nodes(),
                &session_state.frontier,
                snapshot.clone(),
                step,
                allowed.saturating_sub(step),
                self.event_bus.get_sender(),
            )
            .await?;

        // Record the channel versions each node ran against; persisted for
        // resume diagnostics, never used for scheduling.
        for node in &outcome.ran_nodes {
            let mut seen: FxHashMap<String, u64> = FxHashMap::default();
            for channel in ChannelType::ALL {
                seen.insert(channel.to_string(), u64::from(snapshot.version_of(channel)));
            }
            session_state.versions_seen.insert(node.encode(), seen);
        }

        let barrier_outcome = self
            .app
            .apply_barrier(&mut session_state.state, &outcome.ran_nodes, outcome.outputs)
            .await?;

        let next_entries = self
            .app
            .compute_next_frontier(&outcome.ran_nodes, &session_state.state.snapshot())?;
        let next_frontier: Vec<NodeKind> = next_entries.iter().map(|e| e.node.clone()).collect();

        tracing::debug!(
            step,
            updated_channels = ?barrier_outcome.updated_channels,
            error_count = barrier_outcome.errors.len(),
            next_frontier = ?next_frontier,
            "superstep complete"
        );

        let completed =
            next_entries.is_empty() || next_entries.iter().all(|e| e.node.is_end());
        session_state.frontier = next_entries;

        Ok(StepReport {
            step,
            ran_nodes: outcome.ran_nodes,
            skipped_nodes: outcome.skipped_nodes,
            barrier_outcome,
            next_frontier,
            state_versions: StateVersions::of(&session_state.state),
            completed,
        })
    }

    /// Run until the frontier reaches `End` or empties out.
    #[instrument(skip(self, session_id), err)]
    pub async fn run_until_complete(
        &mut self,
        session_id: &str,
    ) -> Result<VersionedState, RunnerError> {
        tracing::info!(session = %session_id, "workflow run started");

        loop {
            let session_state =
                self.sessions
                    .get(session_id)
                    .ok_or_else(|| RunnerError::SessionNotFound {
                        session_id: session_id.to_string(),
                    })?;

            if Self::is_complete(session_state) {
                tracing::info!(
                    session = %session_id,
                    step = session_state.step,
                    "frontier reached terminal state"
                );
                break;
            }

            match self.run_step(session_id).await {
                Ok(report) => {
                    if report.completed {
                        break;
                    }
                }
                Err(err) => {
                    self.emit_session_end(session_id, Some(&err));
                    return Err(err);
                }
            }
        }

        let session_state =
            self.sessions
                .get(session_id)
                .ok_or_else(|| RunnerError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
        let final_state = session_state.state.clone();
        tracing::info!(
            session = %session_id,
            step = session_state.step,
            chat_messages = final_state.chat_history.len(),
            "workflow run completed"
        );
        self.emit_session_end(session_id, None);
        Ok(final_state)
    }

    /// Current state of a session, if it exists.
    #[must_use]
    pub fn get_session(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    /// All active session ids in this runner.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<&String> {
        self.sessions.keys().collect()
    }

    fn is_complete(session_state: &SessionState) -> bool {
        session_state.frontier.is_empty()
            || session_state.frontier.iter().all(|e| e.node.is_end())
    }

    async fn maybe_checkpoint(
        &mut self,
        session_id: &str,
        ran_nodes: &[NodeKind],
        skipped_nodes: &[NodeKind],
        updated_channels: &[&'static str],
    ) {
        if !self.autosave {
            return;
        }
        let (Some(checkpointer), Some(session_state)) =
            (&self.checkpointer, self.sessions.get(session_id))
        else {
            return;
        };
        let mut checkpoint = Checkpoint::from_session(
            session_id,
            session_state,
            self.scheduler.concurrency_limit,
        );
        checkpoint.ran_nodes = ran_nodes.to_vec();
        checkpoint.skipped_nodes = skipped_nodes.to_vec();
        checkpoint.updated_channels = updated_channels.iter().map(|c| c.to_string()).collect();
        if let Err(e) = checkpointer.save(checkpoint).await {
            tracing::warn!(session = %session_id, error = %e, "checkpoint save failed");
        }
    }

    fn emit_session_end(&self, session_id: &str, error: Option<&RunnerError>) {
        let step = self.sessions.get(session_id).map(|s| s.step);
        let message = match (step, error) {
            (Some(step), None) => format!("session={session_id} status=completed step={step}"),
            (Some(step), Some(err)) => {
                format!("session={session_id} status=error step={step} error={err}")
            }
            (None, Some(err)) => format!("session={session_id} status=error error={err}"),
            (None, None) => format!("session={session_id} status=completed"),
        };
        if self
            .event_bus
            .get_sender()
            .send(Event::diagnostic(SESSION_END_SCOPE, message))
            .is_err()
        {
            tracing::debug!(session = %session_id, "event bus closed before session end event");
        }
    }
}
