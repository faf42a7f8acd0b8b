//! The assistant service: conversational turns and background transcription
//! jobs, layered over the workflow graphs and the memory subsystem.
//!
//! One [`Assistant`] owns a completion provider, a results sink, a
//! checkpointer shared with its [`MemoryManager`], and a cache of compiled
//! graphs. Construction is explicit; there is no global instance.
//!
//! The conversational path never surfaces transient errors to the caller:
//! any failure during state preparation or graph execution routes through
//! the one-node fallback graph against the same thread lineage, so the
//! caller always gets a best-effort reply. Only configuration and
//! programming errors (a graph that will not compile, an unreachable
//! database, a fallback that itself dies) come back as [`AssistantError`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::app::{App, AppRunError};
use crate::completion::Completion;
use crate::graphs::GraphCompileError;
use crate::memory::{MemoryError, MemoryManager, ThreadConfig};
use crate::message::Message;
use crate::models::{ExtractedInsights, ProcessingStatus, TranscriptionAnalysis};
use crate::node::NodeError;
use crate::nodes::processing::ResultsSink;
use crate::runtimes::{
    AppRunner, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
    RunnerError, RuntimeConfig,
};
use crate::schedulers::SchedulerError;
use crate::state::{VersionedState, keys};
use crate::workflows::{conversational_workflow, fallback_workflow, transcription_workflow};
use crate::channels::Channel;

/// Author of the synthetic notice injected before a general fallback run.
pub const GENERAL_FALLBACK: &str = "GeneralFallback";
/// Author of the synthetic notice injected when the step bound tripped.
pub const RECURSION_FALLBACK: &str = "RecursionFallback";

const GENERAL_FALLBACK_NOTICE: &str = "Something unexpected happened while handling \
this request. Answer as helpfully as possible from the conversation so far.";

const RECURSION_FALLBACK_NOTICE: &str = "The workflow reached its step limit before \
finishing. Answer as helpfully as possible from the partial work above.";

/// Label of the namespace that isolates transcription lineages from the
/// conversational ones on the same thread.
const TRANSCRIPTION_NS: &str = "transcription";

/// The outcome of one conversational turn.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    /// Content of the last chat-history entry after the run.
    pub response: String,
    pub thread_id: String,
    pub memory_enabled: bool,
    /// Whether the degraded-mode graph produced this reply.
    pub fallback_used: bool,
    /// Chat-history length after the run, the injected user message included.
    pub message_count: usize,
    pub elapsed: Duration,
}

/// The outcome of one background transcription job.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub transcription_id: String,
    pub status: ProcessingStatus,
    pub analysis: Option<TranscriptionAnalysis>,
    pub insights: Option<ExtractedInsights>,
    pub processing_time: Duration,
}

#[derive(Debug, Error, Diagnostic)]
pub enum AssistantError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphCompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpointer(#[from] CheckpointerError),

    #[error("postgres checkpointer selected but no database url configured")]
    #[diagnostic(
        code(threadloom::assistant::no_database_url),
        help("set RuntimeConfig::database_url or the DATABASE_URL environment variable")
    )]
    NoDatabaseUrl,

    /// The degraded-mode graph failed too. The turn is unrecoverable.
    #[error("fallback workflow failed: {source}")]
    #[diagnostic(code(threadloom::assistant::fallback_failed))]
    Fallback {
        #[source]
        source: RunnerError,
    },

    /// A hard failure on a path with no fallback (transcription jobs).
    #[error(transparent)]
    #[diagnostic(transparent)]
    Runner(#[from] RunnerError),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum GraphKind {
    Conversational,
    Fallback,
    Transcription,
}

/// Conversational assistant with checkpointed per-thread memory.
pub struct Assistant {
    completion: Arc<dyn Completion>,
    sink: Arc<dyn ResultsSink>,
    config: RuntimeConfig,
    memory: MemoryManager,
    /// Compiled-graph cache. Compilation runs at most once per kind, under
    /// this lock; every run shares the cached instance.
    graphs: Mutex<FxHashMap<GraphKind, Arc<App>>>,
    /// Per-lineage run serialization, so two turns on one thread cannot
    /// interleave checkpoint writes.
    locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Assistant {
    /// Construct the service: build the configured checkpointer and compile
    /// all three graphs, so configuration mistakes surface here rather than
    /// mid-conversation.
    pub async fn initialize(
        completion: Arc<dyn Completion>,
        sink: Arc<dyn ResultsSink>,
        config: RuntimeConfig,
    ) -> Result<Self, AssistantError> {
        let checkpointer = Self::build_checkpointer(&config).await?;
        let assistant = Self::with_checkpointer(completion, sink, config, checkpointer);
        for kind in [
            GraphKind::Conversational,
            GraphKind::Fallback,
            GraphKind::Transcription,
        ] {
            assistant.graph(kind)?;
        }
        Ok(assistant)
    }

    /// Construct around an existing checkpointer instance. Graphs compile
    /// lazily on first use.
    pub fn with_checkpointer(
        completion: Arc<dyn Completion>,
        sink: Arc<dyn ResultsSink>,
        config: RuntimeConfig,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self {
            completion,
            sink,
            config,
            memory: MemoryManager::new(checkpointer),
            graphs: Mutex::new(FxHashMap::default()),
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    async fn build_checkpointer(
        config: &RuntimeConfig,
    ) -> Result<Arc<dyn Checkpointer>, AssistantError> {
        match config.checkpointer.clone().unwrap_or(CheckpointerType::InMemory) {
            CheckpointerType::InMemory => Ok(Arc::new(InMemoryCheckpointer::new())),
            #[cfg(feature = "postgres")]
            CheckpointerType::Postgres => {
                let url = config
                    .database_url
                    .clone()
                    .or_else(|| std::env::var("DATABASE_URL").ok())
                    .ok_or(AssistantError::NoDatabaseUrl)?;
                let cp =
                    crate::runtimes::checkpointer_postgres::PostgresCheckpointer::connect(&url)
                        .await?;
                Ok(Arc::new(cp))
            }
        }
    }

    /// The memory manager sharing this assistant's checkpointer.
    #[must_use]
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Handle one conversational turn against a thread.
    ///
    /// A new thread starts from a fresh seed state; an existing thread gets
    /// a minimal delta (the new user message, with the previous turn's
    /// leftover tasks and collected data drained). Transient failures route
    /// through the fallback graph, never to the caller.
    #[instrument(skip(self, user_input), err)]
    pub async fn process(
        &self,
        user_input: &str,
        thread_id: &str,
    ) -> Result<AssistantReply, AssistantError> {
        let started = Instant::now();
        let thread = self.memory.create_thread_config(thread_id, "", None);
        let key = thread.session_key();
        let lock = self.lineage_lock(&key);
        let _guard = lock.lock().await;

        let seed = match self.prepare_state(&thread, user_input).await {
            Ok(seed) => seed,
            Err(err) => {
                tracing::error!(thread = thread_id, %err, "state preparation failed");
                let captured = VersionedState::new_with_user_message("Human", user_input);
                return self
                    .fallback(thread_id, &key, captured, GENERAL_FALLBACK, started)
                    .await;
            }
        };

        let app = self.graph(GraphKind::Conversational)?;
        match self.run_graph(app, &key, seed.clone()).await {
            Ok(final_state) => Ok(self.shape_reply(thread_id, &final_state, false, started)),
            Err((err, best_state)) => {
                tracing::error!(thread = thread_id, %err, "conversational graph failed");
                let author = if is_recursion(&err) {
                    RECURSION_FALLBACK
                } else {
                    GENERAL_FALLBACK
                };
                let captured = best_state.unwrap_or(seed);
                self.fallback(thread_id, &key, captured, author, started)
                    .await
            }
        }
    }

    /// Run one transcription payload through the background pipeline.
    ///
    /// No fallback and no recursion guard here: stages swallow their own
    /// failures, and the status reports how much of the pipeline's output
    /// actually materialized.
    #[instrument(skip(self, payload), err)]
    pub async fn process_transcription(
        &self,
        thread_id: &str,
        transcription_id: &str,
        payload: Value,
    ) -> Result<ProcessingResult, AssistantError> {
        let started = Instant::now();
        let mut payload = payload;
        if let Value::Object(map) = &mut payload {
            map.entry("transcription_id")
                .or_insert_with(|| Value::String(transcription_id.to_string()));
        }

        let thread = self
            .memory
            .create_thread_config(thread_id, TRANSCRIPTION_NS, None);
        let key = thread.session_key();
        let lock = self.lineage_lock(&key);
        let _guard = lock.lock().await;

        let state = VersionedState::builder()
            .with_extra(keys::TRANSCRIPTION_DATA, payload)
            .build();
        let app = self.graph(GraphKind::Transcription)?;
        let final_state = self
            .run_graph(app, &key, state)
            .await
            .map_err(|(source, _)| AssistantError::Runner(source))?;

        let snapshot = final_state.snapshot();
        let analysis: Option<TranscriptionAnalysis> = snapshot
            .extra
            .get(keys::ANALYSIS)
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let insights: Option<ExtractedInsights> = snapshot
            .extra
            .get(keys::INSIGHTS)
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        Ok(ProcessingResult {
            transcription_id: transcription_id.to_string(),
            status: ProcessingStatus::from_outputs(analysis.is_some(), insights.is_some()),
            analysis,
            insights,
            processing_time: started.elapsed(),
        })
    }

    /// Seed state for this turn: fresh for a new thread, a minimal delta on
    /// top of the saved state otherwise.
    async fn prepare_state(
        &self,
        thread: &ThreadConfig,
        user_input: &str,
    ) -> Result<VersionedState, MemoryError> {
        let mut state = self.memory.get_thread_state(thread).await?;
        if state.is_empty() {
            return Ok(VersionedState::new_with_user_message("Human", user_input));
        }
        state.push_chat_message(Message::human("Human", user_input));
        *state.tasks.get_mut() = Vec::new();
        *state.collected.get_mut() = Vec::new();
        Ok(state)
    }

    /// Drive a graph over a lineage. On failure, the session's best
    /// available state rides along so the fallback can answer from it.
    async fn run_graph(
        &self,
        app: Arc<App>,
        key: &str,
        state: VersionedState,
    ) -> Result<VersionedState, (RunnerError, Option<VersionedState>)> {
        let event_bus = self.config.event_bus.build_event_bus();
        let mut runner =
            AppRunner::with_checkpointer(app, self.memory.checkpointer(), true, event_bus, true);
        runner
            .start_run(key.to_string(), state)
            .await
            .map_err(|e| (e, None))?;
        match runner.run_until_complete(key).await {
            Ok(final_state) => Ok(final_state),
            Err(err) => {
                let best = runner.get_session(key).map(|s| s.state.clone());
                Err((err, best))
            }
        }
    }

    /// The degraded path: inject the notice, run the one-node fallback
    /// graph against the same lineage, shape the reply once. Never
    /// re-entered from itself; a failure here is terminal for the turn.
    async fn fallback(
        &self,
        thread_id: &str,
        key: &str,
        mut captured: VersionedState,
        author: &str,
        started: Instant,
    ) -> Result<AssistantReply, AssistantError> {
        let notice = if author == RECURSION_FALLBACK {
            RECURSION_FALLBACK_NOTICE
        } else {
            GENERAL_FALLBACK_NOTICE
        };
        captured.push_chat_message(Message::system_from(author, notice));

        let app = self.graph(GraphKind::Fallback)?;
        match self.run_graph(app, key, captured).await {
            Ok(final_state) => Ok(self.shape_reply(thread_id, &final_state, true, started)),
            Err((source, _)) => Err(AssistantError::Fallback { source }),
        }
    }

    fn shape_reply(
        &self,
        thread_id: &str,
        state: &VersionedState,
        fallback_used: bool,
        started: Instant,
    ) -> AssistantReply {
        let snapshot = state.snapshot();
        let response = snapshot
            .last_chat_message()
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "I was not able to produce an answer this time.".to_string());
        AssistantReply {
            response,
            thread_id: thread_id.to_string(),
            memory_enabled: true,
            fallback_used,
            message_count: snapshot.chat_history.len(),
            elapsed: started.elapsed(),
        }
    }

    fn graph(&self, kind: GraphKind) -> Result<Arc<App>, AssistantError> {
        let mut graphs = self.graphs.lock();
        if let Some(app) = graphs.get(&kind) {
            return Ok(app.clone());
        }
        let app = match kind {
            GraphKind::Conversational => {
                conversational_workflow(self.completion.clone(), self.config.clone())?
            }
            GraphKind::Fallback => fallback_workflow(self.completion.clone(), self.config.clone())?,
            GraphKind::Transcription => transcription_workflow(
                self.completion.clone(),
                self.sink.clone(),
                self.config.clone(),
            )?,
        };
        let app = Arc::new(app);
        graphs.insert(kind, app.clone());
        Ok(app)
    }

    fn lineage_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(key.to_string()).or_default().clone()
    }
}

fn is_recursion(err: &RunnerError) -> bool {
    match err {
        RunnerError::StepLimitExceeded { .. } => true,
        RunnerError::Scheduler(SchedulerError::NodeRun {
            source: NodeError::StepLimitExceeded { .. },
            ..
        }) => true,
        RunnerError::Routing(AppRunError::StepLimitExceeded { .. }) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletion;
    use crate::nodes::processing::MemoryResultsSink;
    use serde_json::json;

    fn greeting_scripts() -> ScriptedCompletion {
        ScriptedCompletion::new()
            .script(
                "IntentionSeeker",
                json!({"intention": "greet", "inquiry": "say hello"}),
            )
            .script("Planner", json!({"tasks": []}))
            .script("Touchpoint", json!({"answer": "Hello! How can I help?"}))
    }

    async fn assistant(completion: ScriptedCompletion) -> Assistant {
        Assistant::initialize(
            Arc::new(completion),
            Arc::new(MemoryResultsSink::new()),
            RuntimeConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn greeting_turn_produces_a_reply() {
        let assistant = assistant(greeting_scripts()).await;

        let reply = assistant.process("hi there", "thread-1").await.unwrap();

        assert_eq!(reply.response, "Hello! How can I help?");
        assert!(!reply.fallback_used);
        assert!(reply.memory_enabled);
        assert_eq!(reply.message_count, 2);
    }

    #[tokio::test]
    async fn second_turn_sees_the_first_turn_in_history() {
        let scripts = greeting_scripts()
            .script(
                "IntentionSeeker",
                json!({"intention": "greet", "inquiry": "say hello again"}),
            )
            .script("Planner", json!({"tasks": []}))
            .script("Touchpoint", json!({"answer": "Hello again!"}));
        let assistant = assistant(scripts).await;

        assistant.process("hi", "thread-1").await.unwrap();
        let reply = assistant.process("hi again", "thread-1").await.unwrap();

        assert_eq!(reply.response, "Hello again!");
        // human, answer, human, answer
        assert_eq!(reply.message_count, 4);
    }

    #[tokio::test]
    async fn provider_failure_routes_through_the_fallback() {
        // No script for the intent seeker, so the main graph dies on its
        // first completion call; the touchpoint script serves the fallback.
        let scripts = ScriptedCompletion::new()
            .script("Touchpoint", json!({"answer": "Best effort answer."}));
        let assistant = assistant(scripts).await;

        let reply = assistant.process("summarize", "thread-2").await.unwrap();

        assert!(reply.fallback_used);
        assert_eq!(reply.response, "Best effort answer.");

        let thread = assistant.memory().create_thread_config("thread-2", "", None);
        let state = assistant.memory().get_thread_state(&thread).await.unwrap();
        let notice = state
            .snapshot()
            .chat_history
            .iter()
            .any(|m| m.name.as_deref() == Some(GENERAL_FALLBACK));
        assert!(notice, "the synthetic fallback notice should be in history");
    }

    #[tokio::test]
    async fn step_limit_routes_through_the_recursion_fallback() {
        let scripts = ScriptedCompletion::new()
            .script(
                "IntentionSeeker",
                json!({"intention": "greet", "inquiry": "say hello"}),
            )
            .script("Touchpoint", json!({"answer": "Partial but friendly."}));
        let config = RuntimeConfig {
            recursion_limit: 1,
            ..RuntimeConfig::default()
        };
        let assistant = Assistant::initialize(
            Arc::new(scripts),
            Arc::new(MemoryResultsSink::new()),
            config,
        )
        .await
        .unwrap();

        let reply = assistant.process("hello", "thread-3").await.unwrap();

        assert!(reply.fallback_used);
        assert_eq!(reply.response, "Partial but friendly.");

        let thread = assistant.memory().create_thread_config("thread-3", "", None);
        let state = assistant.memory().get_thread_state(&thread).await.unwrap();
        let notice = state
            .snapshot()
            .chat_history
            .iter()
            .any(|m| m.name.as_deref() == Some(RECURSION_FALLBACK));
        assert!(notice, "the recursion notice should be in history");
    }

    #[tokio::test]
    async fn transcription_with_one_output_reports_partial() {
        // Analyzer scripted, insight extraction not: exactly one output.
        let scripts = ScriptedCompletion::new().script(
            "ProcessingTranscriptionAnalyzer",
            json!({
                "summary": "Planning call.",
                "key_topics": ["planning"],
                "sentiment": "neutral",
                "main_themes": [],
                "important_quotes": [],
                "technical_terms": []
            }),
        );
        let assistant = assistant(scripts).await;

        let result = assistant
            .process_transcription(
                "thread-4",
                "tr-7",
                json!({
                    "text": "We locked the timeline.",
                    "metadata": {"original_filename": "call.wav", "model": "whisper-large"}
                }),
            )
            .await
            .unwrap();

        assert_eq!(result.status, ProcessingStatus::Partial);
        assert!(result.analysis.is_some());
        assert!(result.insights.is_none());
        assert_eq!(result.transcription_id, "tr-7");
    }
}
