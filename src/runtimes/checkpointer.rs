//! Pluggable checkpoint persistence.
//!
//! A [`Checkpoint`] is the complete durable record of one superstep: the
//! six-channel state, the pending frontier, the per-node channel versions,
//! and execution metadata. Backends implement [`Checkpointer`]; the runner
//! saves after every superstep so a session can resume from its latest
//! record after a crash.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::app::FrontierEntry;
use crate::runtimes::session::SessionState;
use crate::state::VersionedState;
use crate::types::NodeKind;

/// Which persistence backend a runner should use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointerType {
    /// Volatile storage; state lives only as long as the process.
    InMemory,
    /// Durable Postgres-backed storage with full step history.
    #[cfg(feature = "postgres")]
    Postgres,
}

/// Durable record of one superstep for one session.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub session_id: String,
    pub step: u64,
    pub state: VersionedState,
    /// Pending frontier targets. Fan-out overlays are not persisted.
    pub frontier: Vec<NodeKind>,
    /// Channel versions each node had seen when it last ran.
    pub versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
    pub concurrency_limit: usize,
    /// Absent when the stored timestamp could not be parsed.
    pub created_at: Option<DateTime<Utc>>,
    pub ran_nodes: Vec<NodeKind>,
    pub skipped_nodes: Vec<NodeKind>,
    pub updated_channels: Vec<String>,
}

impl Checkpoint {
    /// Build a checkpoint from live session state with empty step metadata.
    /// The runner fills `ran_nodes`/`skipped_nodes`/`updated_channels` when
    /// it saves after a real superstep.
    pub fn from_session(session_id: &str, session: &SessionState, concurrency_limit: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            step: session.step_offset + session.step,
            state: session.state.clone(),
            frontier: session.frontier.iter().map(|e| e.node.clone()).collect(),
            versions_seen: session.versions_seen.clone(),
            concurrency_limit,
            created_at: Some(Utc::now()),
            ran_nodes: vec![],
            skipped_nodes: vec![],
            updated_channels: vec![],
        }
    }
}

/// Rebuild live session state from a checkpoint. Frontier entries come back
/// without overlays.
pub fn restore_session_state(checkpoint: &Checkpoint) -> SessionState {
    SessionState {
        state: checkpoint.state.clone(),
        step: checkpoint.step,
        step_offset: 0,
        frontier: checkpoint
            .frontier
            .iter()
            .cloned()
            .map(FrontierEntry::plain)
            .collect(),
        versions_seen: checkpoint.versions_seen.clone(),
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(threadloom::checkpointer::backend))]
    Backend { message: String },

    #[error("checkpoint serialization failed: {source}")]
    #[diagnostic(code(threadloom::checkpointer::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpointer error: {message}")]
    #[diagnostic(code(threadloom::checkpointer::other))]
    Other { message: String },
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Persistence backend contract.
///
/// `session_id` doubles as the conversational thread id: the memory layer
/// addresses threads, the runner addresses sessions, and both resolve to the
/// same rows.
#[async_trait::async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist one checkpoint. Saving the same `(session, step)` twice
    /// replaces the earlier record.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// The most recent checkpoint for a session, if any.
    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>>;

    /// Checkpoint history for a session, most recent first, capped at
    /// `limit` entries.
    async fn list_checkpoints(&self, session_id: &str, limit: usize) -> Result<Vec<Checkpoint>>;

    /// Remove a session and its entire checkpoint history.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// All known session ids, most recently updated first.
    async fn list_sessions(&self) -> Result<Vec<String>>;
}

/// Volatile checkpointer for tests and development.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    // Per session, ordered by step ascending.
    history: Arc<Mutex<FxHashMap<String, Vec<Checkpoint>>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut guard = self.history.lock();
        let steps = guard.entry(checkpoint.session_id.clone()).or_default();
        match steps.iter_mut().find(|c| c.step == checkpoint.step) {
            Some(existing) => *existing = checkpoint,
            None => {
                steps.push(checkpoint);
                steps.sort_by_key(|c| c.step);
            }
        }
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .history
            .lock()
            .get(session_id)
            .and_then(|steps| steps.last().cloned()))
    }

    async fn list_checkpoints(&self, session_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        Ok(self
            .history
            .lock()
            .get(session_id)
            .map(|steps| steps.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.history.lock().remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let guard = self.history.lock();
        let mut sessions: Vec<(&String, DateTime<Utc>)> = guard
            .iter()
            .map(|(id, steps)| {
                let latest = steps
                    .last()
                    .and_then(|c| c.created_at)
                    .unwrap_or_else(Utc::now);
                (id, latest)
            })
            .collect();
        sessions.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(sessions.into_iter().map(|(id, _)| id.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(session: &str, step: u64) -> Checkpoint {
        Checkpoint {
            session_id: session.to_string(),
            step,
            state: VersionedState::default(),
            frontier: vec![NodeKind::End],
            versions_seen: FxHashMap::default(),
            concurrency_limit: 1,
            created_at: Some(Utc::now()),
            ran_nodes: vec![],
            skipped_nodes: vec![],
            updated_channels: vec![],
        }
    }

    #[tokio::test]
    async fn latest_wins_and_history_is_ordered() {
        let cp = InMemoryCheckpointer::new();
        cp.save(checkpoint("s1", 2)).await.unwrap();
        cp.save(checkpoint("s1", 1)).await.unwrap();
        cp.save(checkpoint("s1", 3)).await.unwrap();

        let latest = cp.load_latest("s1").await.unwrap().unwrap();
        assert_eq!(latest.step, 3);

        let history = cp.list_checkpoints("s1", 2).await.unwrap();
        assert_eq!(
            history.iter().map(|c| c.step).collect::<Vec<_>>(),
            vec![3, 2]
        );
    }

    #[tokio::test]
    async fn resaving_a_step_replaces_it() {
        let cp = InMemoryCheckpointer::new();
        cp.save(checkpoint("s1", 1)).await.unwrap();
        cp.save(checkpoint("s1", 1)).await.unwrap();
        assert_eq!(cp.list_checkpoints("s1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_session_clears_history() {
        let cp = InMemoryCheckpointer::new();
        cp.save(checkpoint("s1", 1)).await.unwrap();
        cp.delete_session("s1").await.unwrap();
        assert!(cp.load_latest("s1").await.unwrap().is_none());
        assert!(cp.list_sessions().await.unwrap().is_empty());
    }
}
