//! The unattended transcription-analysis pipeline stages.
//!
//! `load -> analyze -> extract insights -> persist`, strictly linear. No
//! stage aborts the pipeline: a failure becomes a trace message, that
//! stage's output stays absent, and the remaining stages do what they can.
//! The final job status is derived afterwards from which outputs made it
//! into state (see
//! [`ProcessingStatus::from_outputs`](crate::models::ProcessingStatus::from_outputs)).

mod analyzer;
mod insight_extractor;
mod persister;
mod transcription_loader;

pub use analyzer::AnalyzerNode;
pub use insight_extractor::InsightExtractorNode;
pub use persister::{MemoryResultsSink, PersisterNode, ResultsSink, SinkError, StoredResults};
pub use transcription_loader::TranscriptionLoaderNode;

use crate::message::Message;
use crate::models::{ExtractedInsights, TranscriptionAnalysis, TranscriptionData};
use crate::node::NodePartial;
use crate::state::{StateSnapshot, keys};
use serde::de::DeserializeOwned;

/// A stage's "swallowed failure" result: one trace message, nothing else.
pub(crate) fn stage_failure(agent: &str, message: impl AsRef<str>) -> NodePartial {
    let message = message.as_ref();
    tracing::error!(target: "threadloom::processing", agent, message);
    NodePartial::new().with_messages(vec![Message::agent(agent, message)])
}

fn read_extra<T: DeserializeOwned>(snapshot: &StateSnapshot, key: &str) -> Option<T> {
    snapshot
        .extra
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// The normalized transcription payload, when the loader has produced one.
pub(crate) fn transcription_data(snapshot: &StateSnapshot) -> Option<TranscriptionData> {
    read_extra(snapshot, keys::TRANSCRIPTION_DATA)
}

/// The analyzer's output, when present.
pub(crate) fn analysis(snapshot: &StateSnapshot) -> Option<TranscriptionAnalysis> {
    read_extra(snapshot, keys::ANALYSIS)
}

/// The insight extractor's output, when present.
pub(crate) fn insights(snapshot: &StateSnapshot) -> Option<ExtractedInsights> {
    read_extra(snapshot, keys::INSIGHTS)
}
