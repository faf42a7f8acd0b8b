//! Second pipeline stage: run the transcript text through the completion
//! provider and store the structured analysis.

use std::sync::Arc;

use async_trait::async_trait;

use crate::completion::{Completion, CompletionRequest, complete_as};
use crate::message::Message;
use crate::models::TranscriptionAnalysis;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::{StateSnapshot, keys};
use crate::utils::collections::new_extra_map;

use super::{stage_failure, transcription_data};

const AGENT: &str = "ProcessingTranscriptionAnalyzer";

const SYSTEM: &str = "You analyze meeting and call transcriptions. Produce a \
concise summary, the key topics, an overall sentiment, the main themes, the \
most important quotes, and any technical terms that appear.";

/// Turns the loaded transcription into a [`TranscriptionAnalysis`] under
/// the `analysis` key. Skips itself with a trace message when the loader
/// produced nothing.
pub struct AnalyzerNode {
    completion: Arc<dyn Completion>,
}

impl AnalyzerNode {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }
}

fn prompt(data: &crate::models::TranscriptionData) -> String {
    let mut prompt = format!("Transcription ({}):\n{}", data.transcription_id, data.text);
    if let Some(language) = &data.language {
        prompt.push_str(&format!("\n\nLanguage: {language}"));
    }
    if let Some(duration) = data.duration {
        prompt.push_str(&format!("\nDuration: {duration:.1}s"));
    }
    prompt
}

#[async_trait]
impl Node for AnalyzerNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let Some(data) = transcription_data(&snapshot) else {
            return Ok(stage_failure(
                AGENT,
                "No loaded transcription available for analysis",
            ));
        };

        let request = CompletionRequest::new(AGENT, SYSTEM, prompt(&data), "TranscriptionAnalysis");
        let analysis: TranscriptionAnalysis =
            match complete_as(self.completion.as_ref(), request).await {
                Ok(analysis) => analysis,
                Err(err) => {
                    return Ok(stage_failure(AGENT, format!("Analysis failed: {err}")));
                }
            };

        ctx.emit(
            "processing",
            format!(
                "analyzed transcription {} ({} topic(s))",
                data.transcription_id,
                analysis.key_topics.len()
            ),
        )?;

        let mut extra = new_extra_map();
        extra.insert(keys::ANALYSIS.to_string(), serde_json::to_value(&analysis)?);

        Ok(NodePartial::new()
            .with_messages(vec![Message::agent(
                AGENT,
                &format!("Analysis complete: {}", analysis.summary),
            )])
            .with_extra(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletion;
    use crate::event_bus::Event;
    use crate::models::{TranscriptionData, TranscriptionMetadata};
    use crate::state::VersionedState;
    use serde_json::json;

    fn ctx() -> (NodeContext, flume::Receiver<Event>) {
        let (tx, rx) = flume::unbounded();
        (
            NodeContext {
                node_id: "analyze_content".into(),
                step: 2,
                remaining_steps: 10,
                event_bus_sender: tx,
            },
            rx,
        )
    }

    fn loaded_state() -> VersionedState {
        let data = TranscriptionData {
            transcription_id: "tr-1".into(),
            text: "We agreed to ship the beta next week.".into(),
            duration: None,
            language: None,
            metadata: TranscriptionMetadata {
                original_filename: "standup.wav".into(),
                model: "whisper-large".into(),
                confidence_score: None,
                processing_time: None,
            },
        };
        VersionedState::builder()
            .with_user_message("user", "process this")
            .with_extra(
                keys::TRANSCRIPTION_DATA,
                serde_json::to_value(data).unwrap(),
            )
            .build()
    }

    #[tokio::test]
    async fn analysis_lands_in_extra() {
        let completion = Arc::new(ScriptedCompletion::new().script(
            AGENT,
            json!({
                "summary": "Beta ships next week.",
                "key_topics": ["beta", "release"],
                "sentiment": "positive",
                "main_themes": ["planning"],
                "important_quotes": ["ship the beta next week"],
                "technical_terms": []
            }),
        ));
        let (ctx, _rx) = ctx();

        let partial = AnalyzerNode::new(completion)
            .run(loaded_state().snapshot(), ctx)
            .await
            .unwrap();

        let extra = partial.extra.unwrap();
        let analysis: TranscriptionAnalysis =
            serde_json::from_value(extra[keys::ANALYSIS].clone()).unwrap();
        assert_eq!(analysis.key_topics, vec!["beta", "release"]);
    }

    #[tokio::test]
    async fn provider_failure_is_swallowed() {
        let completion = Arc::new(ScriptedCompletion::new());
        let (ctx, _rx) = ctx();

        let partial = AnalyzerNode::new(completion)
            .run(loaded_state().snapshot(), ctx)
            .await
            .unwrap();

        assert!(partial.extra.is_none());
        let messages = partial.messages.unwrap();
        assert!(messages[0].content.contains("Analysis failed"));
    }

    #[tokio::test]
    async fn missing_transcription_is_skipped() {
        let completion = Arc::new(ScriptedCompletion::new());
        let (ctx, _rx) = ctx();

        let partial = AnalyzerNode::new(completion)
            .run(VersionedState::new_with_user_message("user", "hi").snapshot(), ctx)
            .await
            .unwrap();

        let messages = partial.messages.unwrap();
        assert!(messages[0].content.contains("No loaded transcription"));
    }
}
