mod append;
mod map_merge;
mod reducer_registry;
mod reset_when_empty;

pub use append::{AppendChatHistory, AppendErrors, AppendTrace};
pub use map_merge::MapMerge;
pub use reducer_registry::*;
pub use reset_when_empty::{ResetCollected, ResetTasks};

use crate::node::NodePartial;
use crate::state::VersionedState;
use crate::types::ChannelType;
use miette::Diagnostic;
use thiserror::Error;

/// Unified reducer trait: every reducer mutates VersionedState using a
/// NodePartial delta. Two merge disciplines exist for list channels: append
/// (chat history, trace, errors) and reset-on-empty (tasks, collected data);
/// the extra map merges last-writer-wins per key.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial);
}

#[derive(Debug, Error, Diagnostic)]
pub enum ReducerError {
    #[error("no reducers registered for channel: {0:?}")]
    #[diagnostic(code(threadloom::reducers::unknown_channel))]
    UnknownChannel(ChannelType),

    #[error("reducer apply failed for channel {channel:?}: {message}")]
    #[diagnostic(code(threadloom::reducers::apply))]
    Apply {
        channel: ChannelType,
        message: String,
    },
}
