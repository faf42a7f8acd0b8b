//! Workflow runtime: sessions, checkpointing, and resumable execution.
//!
//! The runtime layer wraps a compiled [`App`](crate::app::App) with
//! everything needed to run it as a long-lived, persistent service:
//!
//! - **[`AppRunner`]** - drives supersteps for named sessions
//! - **[`Checkpointer`]** - pluggable persistence for session history
//! - **[`SessionState`]** - live execution state of one session
//! - **[`RuntimeConfig`]** - limits, persistence choice, and event sinks
//!
//! A session id doubles as the conversation thread id: running the same id
//! again resumes from the latest checkpoint.
//!
//! # Backends
//!
//! - **[`InMemoryCheckpointer`]** - volatile, for tests and development
//! - **`PostgresCheckpointer`** - durable, with full step history (behind
//!   the `postgres` feature)
//!
//! # Usage
//!
//! ```rust,no_run
//! use threadloom::runtimes::{AppRunner, CheckpointerType};
//! use threadloom::state::VersionedState;
//! # use threadloom::app::App;
//! # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
//! let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await?;
//! let initial = VersionedState::new_with_user_message("Human", "hello");
//!
//! runner.create_session("thread-1".to_string(), initial).await?;
//! let final_state = runner.run_until_complete("thread-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod checkpointer;
#[cfg(feature = "postgres")]
pub mod checkpointer_postgres;
pub mod persistence;
pub mod runner;
pub mod runtime_config;
pub mod session;

pub use checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
    restore_session_state,
};
#[cfg(feature = "postgres")]
pub use checkpointer_postgres::PostgresCheckpointer;
pub use persistence::{
    PersistedCheckpoint, PersistedMapChannel, PersistedState, PersistedVecChannel,
    PersistedVersionsSeen, PersistenceError,
};
pub use runner::{AppRunner, RunnerError, SESSION_END_SCOPE, StepReport};
pub use runtime_config::{
    DEFAULT_RECURSION_LIMIT, EventBusConfig, RuntimeConfig, SinkConfig,
};
pub use session::{SessionInit, SessionState, StateVersions};
