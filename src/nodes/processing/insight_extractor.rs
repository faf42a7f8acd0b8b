//! Third pipeline stage: distill the analysis into actionable insights.

use std::sync::Arc;

use async_trait::async_trait;

use crate::completion::{Completion, CompletionRequest, complete_as};
use crate::message::Message;
use crate::models::{ExtractedInsights, TranscriptionAnalysis};
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::{StateSnapshot, keys};
use crate::utils::collections::new_extra_map;

use super::{analysis, stage_failure};

const AGENT: &str = "ProcessingInsightExtractor";

const SYSTEM: &str = "You extract structured insights from a transcription \
analysis: the key insights, concrete action items, decisions that were made, \
open questions, and follow-ups worth scheduling.";

/// Reads `analysis` and stores an [`ExtractedInsights`] under `insights`.
/// Without an analysis there is nothing to extract from, so this stage
/// records that and moves on.
pub struct InsightExtractorNode {
    completion: Arc<dyn Completion>,
}

impl InsightExtractorNode {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }
}

fn prompt(analysis: &TranscriptionAnalysis) -> String {
    format!(
        "Summary: {}\nKey topics: {}\nSentiment: {}\nMain themes: {}\nImportant quotes:\n{}",
        analysis.summary,
        analysis.key_topics.join(", "),
        analysis.sentiment,
        analysis.main_themes.join(", "),
        analysis
            .important_quotes
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[async_trait]
impl Node for InsightExtractorNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let Some(analysis) = analysis(&snapshot) else {
            return Ok(stage_failure(
                AGENT,
                "No analysis available for insight extraction",
            ));
        };

        let request = CompletionRequest::new(AGENT, SYSTEM, prompt(&analysis), "ExtractedInsights");
        let insights: ExtractedInsights = match complete_as(self.completion.as_ref(), request).await
        {
            Ok(insights) => insights,
            Err(err) => {
                return Ok(stage_failure(
                    AGENT,
                    format!("Insight extraction failed: {err}"),
                ));
            }
        };

        ctx.emit(
            "processing",
            format!(
                "extracted {} insight(s), {} action item(s)",
                insights.key_insights.len(),
                insights.action_items.len()
            ),
        )?;

        let mut extra = new_extra_map();
        extra.insert(keys::INSIGHTS.to_string(), serde_json::to_value(&insights)?);

        Ok(NodePartial::new()
            .with_messages(vec![Message::agent(
                AGENT,
                &format!(
                    "Extracted {} insight(s) and {} action item(s)",
                    insights.key_insights.len(),
                    insights.action_items.len()
                ),
            )])
            .with_extra(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletion;
    use crate::event_bus::Event;
    use crate::state::VersionedState;
    use serde_json::json;

    fn ctx() -> (NodeContext, flume::Receiver<Event>) {
        let (tx, rx) = flume::unbounded();
        (
            NodeContext {
                node_id: "extract_insights".into(),
                step: 3,
                remaining_steps: 10,
                event_bus_sender: tx,
            },
            rx,
        )
    }

    fn analyzed_state() -> VersionedState {
        VersionedState::builder()
            .with_user_message("user", "process this")
            .with_extra(
                keys::ANALYSIS,
                json!({
                    "summary": "Beta ships next week.",
                    "key_topics": ["beta"],
                    "sentiment": "positive",
                    "main_themes": ["planning"],
                    "important_quotes": [],
                    "technical_terms": []
                }),
            )
            .build()
    }

    #[tokio::test]
    async fn insights_land_in_extra() {
        let completion = Arc::new(ScriptedCompletion::new().script(
            AGENT,
            json!({
                "key_insights": ["team is on track"],
                "action_items": ["cut the release branch"],
                "decisions": ["ship next week"],
                "questions": [],
                "follow_ups": ["retro after launch"]
            }),
        ));
        let (ctx, _rx) = ctx();

        let partial = InsightExtractorNode::new(completion)
            .run(analyzed_state().snapshot(), ctx)
            .await
            .unwrap();

        let extra = partial.extra.unwrap();
        let insights: ExtractedInsights =
            serde_json::from_value(extra[keys::INSIGHTS].clone()).unwrap();
        assert_eq!(insights.action_items, vec!["cut the release branch"]);
    }

    #[tokio::test]
    async fn missing_analysis_is_recorded_and_skipped() {
        let completion = Arc::new(ScriptedCompletion::new());
        let (ctx, _rx) = ctx();

        let partial = InsightExtractorNode::new(completion)
            .run(VersionedState::new_with_user_message("user", "hi").snapshot(), ctx)
            .await
            .unwrap();

        assert!(partial.extra.is_none());
        let messages = partial.messages.unwrap();
        assert!(messages[0].content.contains("No analysis available"));
    }
}
