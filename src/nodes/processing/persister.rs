//! Final pipeline stage: write the produced results to a sink.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::message::Message;
use crate::models::{ExtractedInsights, TranscriptionAnalysis};
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::StateSnapshot;

use super::{analysis, insights, stage_failure, transcription_data};

const AGENT: &str = "ProcessingResultsStorage";

/// Everything one transcription job produced, written as a single unit.
#[derive(Debug, Clone)]
pub struct StoredResults {
    pub transcription_id: String,
    pub analysis: Option<TranscriptionAnalysis>,
    pub insights: Option<ExtractedInsights>,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SinkError {
    #[error("results sink rejected the write: {message}")]
    #[diagnostic(
        code(threadloom::processing::sink),
        help("the write was rolled back; nothing was persisted for this job")
    )]
    Storage { message: String },
}

/// Destination for finished transcription results. A store is all-or-nothing:
/// implementations must not leave a partial record behind on failure.
#[async_trait]
pub trait ResultsSink: Send + Sync {
    async fn store(&self, results: StoredResults) -> Result<(), SinkError>;
}

/// In-process sink backed by a map, keyed by transcription id. A repeated
/// store for the same id replaces the previous record.
#[derive(Default)]
pub struct MemoryResultsSink {
    results: Mutex<FxHashMap<String, StoredResults>>,
}

impl MemoryResultsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, transcription_id: &str) -> Option<StoredResults> {
        self.results.lock().get(transcription_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }
}

#[async_trait]
impl ResultsSink for MemoryResultsSink {
    async fn store(&self, results: StoredResults) -> Result<(), SinkError> {
        self.results
            .lock()
            .insert(results.transcription_id.clone(), results);
        Ok(())
    }
}

/// Persists whatever the earlier stages produced. With neither an analysis
/// nor insights in state there is nothing worth writing, and that is
/// recorded as a failure of this stage.
pub struct PersisterNode {
    sink: Arc<dyn ResultsSink>,
}

impl PersisterNode {
    pub fn new(sink: Arc<dyn ResultsSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Node for PersisterNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let Some(data) = transcription_data(&snapshot) else {
            return Ok(stage_failure(
                AGENT,
                "No transcription in state, nothing to persist",
            ));
        };

        let analysis = analysis(&snapshot);
        let insights = insights(&snapshot);
        if analysis.is_none() && insights.is_none() {
            return Ok(stage_failure(
                AGENT,
                format!(
                    "No results produced for transcription {}, skipping storage",
                    data.transcription_id
                ),
            ));
        }

        let results = StoredResults {
            transcription_id: data.transcription_id.clone(),
            analysis,
            insights,
            stored_at: Utc::now(),
        };
        if let Err(err) = self.sink.store(results).await {
            return Ok(stage_failure(AGENT, format!("Storage failed: {err}")));
        }

        ctx.emit(
            "processing",
            format!("stored results for transcription {}", data.transcription_id),
        )?;

        Ok(NodePartial::new().with_messages(vec![Message::agent(
            AGENT,
            &format!(
                "Stored results for transcription {}",
                data.transcription_id
            ),
        )]))
    }
}
