//! Domain payload types carried through workflow state.
//!
//! These are the typed values that nodes produce and that the memory layer
//! rehydrates from checkpoints: the intent classification, planned tasks and
//! their collected data, and the transcription-processing payloads.

mod intention;
mod tasks;
mod transcription;

pub use intention::Intention;
pub use tasks::{CollectedData, TaskAssignment, TaskItem, TaskPlan};
pub use transcription::{
    ExtractedInsights, ProcessingStatus, TranscriptionAnalysis, TranscriptionData,
    TranscriptionMetadata,
};
