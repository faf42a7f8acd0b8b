//! Thread memory: durable conversation state addressed by thread id.
//!
//! [`MemoryManager`] is the facade the assistant service (and diagnostic
//! callers) use to work with a thread's persisted state without touching
//! the runtime directly: build a [`ThreadConfig`] address, fetch the latest
//! state, inspect checkpoint history, or wipe a thread.
//!
//! A thread id doubles as the runtime session id; a non-empty checkpoint
//! namespace selects an independent state lineage for the same thread (the
//! fallback flow runs in the main lineage, but diagnostic replays can use
//! their own).

pub mod envelope;

use crate::channels::Channel;
use crate::runtimes::{Checkpointer, CheckpointerError, PersistedState};
use crate::state::VersionedState;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Default history depth for [`MemoryManager::get_thread_checkpoints`].
pub const DEFAULT_CHECKPOINT_LIMIT: usize = 20;

/// History depth scanned when a config addresses one specific checkpoint.
const HISTORY_SCAN_LIMIT: usize = 1000;

/// Storage address of a thread's state.
///
/// Two configs with the same fields address the same checkpoint lineage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadConfig {
    pub thread_id: String,
    /// Independent state lineage within the thread. Empty selects the main
    /// conversation lineage.
    pub checkpoint_ns: String,
    /// Addresses one specific checkpoint instead of the latest, when set.
    pub checkpoint_id: Option<String>,
}

impl ThreadConfig {
    #[must_use]
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_ns: String::new(),
            checkpoint_id: None,
        }
    }

    /// The storage key this config addresses.
    #[must_use]
    pub fn session_key(&self) -> String {
        if self.checkpoint_ns.is_empty() {
            self.thread_id.clone()
        } else {
            format!("{}:{}", self.thread_id, self.checkpoint_ns)
        }
    }
}

/// One checkpoint in a thread's history, as reported to callers.
#[derive(Clone, Debug)]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    pub thread_id: String,
    /// Absent when the stored timestamp could not be parsed.
    pub created_at: Option<DateTime<Utc>>,
    pub step: u64,
    pub ran_nodes: Vec<String>,
    pub updated_channels: Vec<String>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum MemoryError {
    #[error("thread_id is required but was empty")]
    #[diagnostic(
        code(threadloom::memory::missing_thread_id),
        help("destructive operations refuse to run against an unnamed thread")
    )]
    MissingThreadId,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpointer(#[from] CheckpointerError),

    #[error("stored state did not decode")]
    #[diagnostic(code(threadloom::memory::rehydration))]
    Rehydration {
        #[source]
        source: serde_json::Error,
    },
}

/// Facade over a [`Checkpointer`] for thread-level memory operations.
#[derive(Clone)]
pub struct MemoryManager {
    checkpointer: Arc<dyn Checkpointer>,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager").finish_non_exhaustive()
    }
}

impl MemoryManager {
    #[must_use]
    pub fn new(checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self { checkpointer }
    }

    /// Builds the addressing tuple for a thread. Pure construction, no I/O.
    #[must_use]
    pub fn create_thread_config(
        &self,
        thread_id: impl Into<String>,
        checkpoint_ns: impl Into<String>,
        checkpoint_id: Option<String>,
    ) -> ThreadConfig {
        ThreadConfig {
            thread_id: thread_id.into(),
            checkpoint_ns: checkpoint_ns.into(),
            checkpoint_id,
        }
    }

    /// Latest state for the addressed thread, with constructor envelopes in
    /// the extra channel rehydrated into plain typed values.
    ///
    /// A thread with no checkpoints yields an empty state, not an error;
    /// that is how a new thread is distinguished from a continuing one.
    #[instrument(skip(self, config), fields(thread = %config.thread_id), err)]
    pub async fn get_thread_state(
        &self,
        config: &ThreadConfig,
    ) -> Result<VersionedState, MemoryError> {
        let key = config.session_key();
        let checkpoint = match &config.checkpoint_id {
            None => self.checkpointer.load_latest(&key).await?,
            Some(id) => self
                .checkpointer
                .list_checkpoints(&key, HISTORY_SCAN_LIMIT)
                .await?
                .into_iter()
                .find(|cp| cp.step.to_string() == *id),
        };

        let Some(checkpoint) = checkpoint else {
            return Ok(VersionedState::default());
        };

        let mut state = checkpoint.state;
        for value in state.extra.get_mut().values_mut() {
            let raw = std::mem::take(value);
            *value = envelope::rehydrate_value(raw);
        }
        Ok(state)
    }

    /// Decodes a raw persisted state blob, rehydrating any constructor
    /// envelopes it contains first.
    pub fn rehydrate_state(&self, raw: Value) -> Result<VersionedState, MemoryError> {
        let persisted: PersistedState = envelope::rehydrate_as(raw)
            .map_err(|source| MemoryError::Rehydration { source })?;
        Ok(VersionedState::from(persisted))
    }

    /// Deletes every checkpoint for the addressed thread lineage.
    ///
    /// An empty `thread_id` is a caller bug, not a runtime condition, and
    /// is rejected before anything is touched.
    #[instrument(skip(self, config), fields(thread = %config.thread_id), err)]
    pub async fn reset_thread_state(&self, config: &ThreadConfig) -> Result<(), MemoryError> {
        if config.thread_id.is_empty() {
            return Err(MemoryError::MissingThreadId);
        }
        self.checkpointer.delete_session(&config.session_key()).await?;
        tracing::info!(thread = %config.thread_id, "thread state reset");
        Ok(())
    }

    /// Up to `limit` most recent checkpoint summaries, newest first.
    #[instrument(skip(self, config), fields(thread = %config.thread_id), err)]
    pub async fn get_thread_checkpoints(
        &self,
        config: &ThreadConfig,
        limit: usize,
    ) -> Result<Vec<CheckpointSummary>, MemoryError> {
        let checkpoints = self
            .checkpointer
            .list_checkpoints(&config.session_key(), limit)
            .await?;
        Ok(checkpoints
            .into_iter()
            .map(|cp| CheckpointSummary {
                checkpoint_id: cp.step.to_string(),
                thread_id: config.thread_id.clone(),
                created_at: cp.created_at,
                step: cp.step,
                // Summaries are caller-facing, so node names use the display
                // form, not the persisted encoding.
                ran_nodes: cp.ran_nodes.iter().map(|k| k.to_string()).collect(),
                updated_channels: cp.updated_channels,
            })
            .collect())
    }

    /// All thread keys known to the backing store.
    pub async fn list_threads(&self) -> Result<Vec<String>, MemoryError> {
        Ok(self.checkpointer.list_sessions().await?)
    }

    /// The backing checkpointer, for runtime wiring.
    #[must_use]
    pub fn checkpointer(&self) -> Arc<dyn Checkpointer> {
        self.checkpointer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::runtimes::{Checkpoint, InMemoryCheckpointer, SessionState};
    use crate::types::NodeKind;
    use serde_json::json;

    fn manager() -> (MemoryManager, Arc<InMemoryCheckpointer>) {
        let cp = Arc::new(InMemoryCheckpointer::new());
        (MemoryManager::new(cp.clone()), cp)
    }

    fn save_step(session: &SessionState, key: &str, step: u64) -> Checkpoint {
        let mut cp = Checkpoint::from_session(key, session, 1);
        cp.step = step;
        cp
    }

    #[tokio::test]
    async fn empty_thread_yields_empty_state() {
        let (mgr, _) = manager();
        let config = mgr.create_thread_config("t-1", "", None);
        let state = mgr.get_thread_state(&config).await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn thread_config_is_idempotent() {
        let (mgr, _) = manager();
        let a = mgr.create_thread_config("t-1", "ns", None);
        let b = mgr.create_thread_config("t-1", "ns", None);
        assert_eq!(a, b);
        assert_eq!(a.session_key(), b.session_key());
    }

    #[tokio::test]
    async fn namespaces_address_distinct_lineages() {
        let (mgr, _) = manager();
        let main = mgr.create_thread_config("t-1", "", None);
        let side = mgr.create_thread_config("t-1", "replay", None);
        assert_ne!(main.session_key(), side.session_key());
    }

    #[tokio::test]
    async fn envelopes_in_extra_are_rehydrated() {
        let (mgr, store) = manager();
        let msg = Message::agent("Touchpoint", "hello again");
        let mut state = VersionedState::default();
        state.add_extra(
            "pending_reply",
            envelope::encode(&["assistant", "models", "Message"], &msg).unwrap(),
        );
        let session = SessionState::new(state, vec![]);
        store.save(save_step(&session, "t-1", 1)).await.unwrap();

        let config = mgr.create_thread_config("t-1", "", None);
        let loaded = mgr.get_thread_state(&config).await.unwrap();
        assert_eq!(
            loaded.snapshot().extra["pending_reply"],
            serde_json::to_value(&msg).unwrap()
        );
    }

    #[tokio::test]
    async fn reset_requires_a_thread_id() {
        let (mgr, _) = manager();
        let config = mgr.create_thread_config("", "", None);
        let err = mgr.reset_thread_state(&config).await.unwrap_err();
        assert!(matches!(err, MemoryError::MissingThreadId));
    }

    #[tokio::test]
    async fn reset_then_get_yields_empty_state_again() {
        let (mgr, store) = manager();
        let state = VersionedState::new_with_user_message("Human", "hi");
        let session = SessionState::new(state, vec![]);
        store.save(save_step(&session, "t-1", 1)).await.unwrap();

        let config = mgr.create_thread_config("t-1", "", None);
        assert!(!mgr.get_thread_state(&config).await.unwrap().is_empty());

        mgr.reset_thread_state(&config).await.unwrap();
        assert!(mgr.get_thread_state(&config).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_summaries_are_newest_first_and_limited() {
        let (mgr, store) = manager();
        let session = SessionState::new(VersionedState::default(), vec![]);
        for step in 1..=5 {
            let mut cp = save_step(&session, "t-1", step);
            cp.ran_nodes = vec![NodeKind::Custom("planner".into())];
            cp.updated_channels = vec!["messages".into()];
            store.save(cp).await.unwrap();
        }

        let config = mgr.create_thread_config("t-1", "", None);
        let summaries = mgr.get_thread_checkpoints(&config, 3).await.unwrap();
        assert_eq!(
            summaries.iter().map(|s| s.step).collect::<Vec<_>>(),
            vec![5, 4, 3]
        );
        assert_eq!(summaries[0].checkpoint_id, "5");
        assert_eq!(summaries[0].ran_nodes, vec!["planner".to_string()]);
        assert!(summaries[0].created_at.is_some());
    }

    #[tokio::test]
    async fn checkpoint_id_addresses_a_specific_step() {
        let (mgr, store) = manager();
        for step in 1..=3 {
            let mut state = VersionedState::default();
            state.add_extra("step_marker", json!(step));
            let session = SessionState::new(state, vec![]);
            store.save(save_step(&session, "t-1", step)).await.unwrap();
        }

        let config = mgr.create_thread_config("t-1", "", Some("2".into()));
        let state = mgr.get_thread_state(&config).await.unwrap();
        assert_eq!(state.snapshot().extra["step_marker"], json!(2));
    }

    #[test]
    fn rehydrate_state_decodes_enveloped_history() {
        let (mgr, _) = manager();
        let msg = Message::human("Human", "what happened?");
        let raw = json!({
            "chat_history": {
                "version": 3,
                "items": [envelope::encode(&["assistant", "models", "Message"], &msg).unwrap()]
            }
        });
        let state = mgr.rehydrate_state(raw).unwrap();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.chat_history, vec![msg]);
        assert_eq!(snapshot.chat_history_version, 3);
    }
}
