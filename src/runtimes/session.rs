//! Session state carried across supersteps.

use rustc_hash::FxHashMap;

use crate::app::FrontierEntry;
use crate::state::VersionedState;

/// Everything the runner needs to resume a session: the versioned state,
/// the current step number, the pending frontier, and the channel versions
/// each node had seen when it last ran (recorded for persistence and
/// debugging, not for scheduling decisions).
///
/// Fan-out overlays on the frontier are ephemeral: a checkpoint taken while
/// branches are pending persists only the branch targets, and a resumed
/// session re-runs them against durable state alone.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub state: VersionedState,
    /// Supersteps taken by the current run. The recursion limit applies to
    /// this counter, not the lifetime of the session.
    pub step: u64,
    /// Steps accumulated by earlier runs on the same session lineage;
    /// checkpoints record `step_offset + step` so step numbers stay
    /// monotonic across turns.
    pub step_offset: u64,
    pub frontier: Vec<FrontierEntry>,
    pub versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
}

impl SessionState {
    pub fn new(state: VersionedState, frontier: Vec<FrontierEntry>) -> Self {
        Self {
            state,
            step: 0,
            step_offset: 0,
            frontier,
            versions_seen: FxHashMap::default(),
        }
    }
}

/// Indicates how a session was initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInit {
    /// A brand new session was created.
    Fresh,
    /// An existing session was resumed from a checkpoint.
    Resumed {
        /// The step number at which the session was checkpointed.
        checkpoint_step: u64,
    },
}

/// Snapshot of channel versions after a step.
#[derive(Debug, Clone, Default)]
pub struct StateVersions {
    pub chat_history_version: u32,
    pub messages_version: u32,
    pub tasks_version: u32,
    pub collected_version: u32,
    pub extra_version: u32,
    pub errors_version: u32,
}

impl StateVersions {
    pub fn of(state: &VersionedState) -> Self {
        use crate::channels::Channel;
        Self {
            chat_history_version: state.chat_history.version(),
            messages_version: state.messages.version(),
            tasks_version: state.tasks.version(),
            collected_version: state.collected.version(),
            extra_version: state.extra.version(),
            errors_version: state.errors.version(),
        }
    }
}
