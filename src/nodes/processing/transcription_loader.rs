//! First pipeline stage: validate and normalize the raw transcription
//! payload that the caller seeded into the `extra` channel.

use async_trait::async_trait;

use crate::message::Message;
use crate::models::TranscriptionData;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::{StateSnapshot, keys};
use crate::utils::collections::new_extra_map;

use super::stage_failure;

const AGENT: &str = "ProcessingTranscriptionLoader";

/// How much of the transcript text the success trace message quotes.
const PREVIEW_LEN: usize = 120;

/// Decodes the raw payload under `transcription_data`, rejects unusable
/// ones, and writes the normalized form back for the later stages.
///
/// This stage is purely local: no completion provider is involved.
#[derive(Debug, Default)]
pub struct TranscriptionLoaderNode;

impl TranscriptionLoaderNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for TranscriptionLoaderNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let Some(raw) = snapshot.extra.get(keys::TRANSCRIPTION_DATA) else {
            return Ok(stage_failure(
                AGENT,
                "No transcription payload found in state",
            ));
        };

        let mut data: TranscriptionData = match serde_json::from_value(raw.clone()) {
            Ok(data) => data,
            Err(err) => {
                return Ok(stage_failure(
                    AGENT,
                    format!("Transcription payload could not be decoded: {err}"),
                ));
            }
        };

        data.text = data.text.trim().to_string();
        if data.text.is_empty() {
            return Ok(stage_failure(AGENT, "Transcription text is empty"));
        }
        if data.transcription_id.trim().is_empty() {
            return Ok(stage_failure(AGENT, "Transcription id is missing"));
        }

        ctx.emit(
            "processing",
            format!("loaded transcription {}", data.transcription_id),
        )?;

        let preview: String = data.text.chars().take(PREVIEW_LEN).collect();
        let mut extra = new_extra_map();
        extra.insert(
            keys::TRANSCRIPTION_DATA.to_string(),
            serde_json::to_value(&data)?,
        );

        Ok(NodePartial::new()
            .with_messages(vec![Message::agent(
                AGENT,
                &format!("Loaded transcription for processing: {preview}"),
            )])
            .with_extra(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::Event;
    use crate::models::TranscriptionMetadata;
    use crate::state::VersionedState;
    use serde_json::json;

    fn ctx() -> (NodeContext, flume::Receiver<Event>) {
        let (tx, rx) = flume::unbounded();
        (
            NodeContext {
                node_id: "load_transcription".into(),
                step: 1,
                remaining_steps: 10,
                event_bus_sender: tx,
            },
            rx,
        )
    }

    fn payload() -> TranscriptionData {
        TranscriptionData {
            transcription_id: "tr-1".into(),
            text: "  We agreed to ship the beta next week.  ".into(),
            duration: Some(42.0),
            language: Some("en".into()),
            metadata: TranscriptionMetadata {
                original_filename: "standup.wav".into(),
                model: "whisper-large".into(),
                confidence_score: Some(0.93),
                processing_time: None,
            },
        }
    }

    #[tokio::test]
    async fn valid_payload_is_normalized_and_announced() {
        let state = VersionedState::builder()
            .with_user_message("user", "kick off")
            .with_extra(
                keys::TRANSCRIPTION_DATA,
                serde_json::to_value(payload()).unwrap(),
            )
            .build();
        let (ctx, _rx) = ctx();

        let partial = TranscriptionLoaderNode::new()
            .run(state.snapshot(), ctx)
            .await
            .unwrap();

        let extra = partial.extra.unwrap();
        let stored: TranscriptionData =
            serde_json::from_value(extra[keys::TRANSCRIPTION_DATA].clone()).unwrap();
        assert_eq!(stored.text, "We agreed to ship the beta next week.");
        let messages = partial.messages.unwrap();
        assert!(messages[0].content.starts_with("Loaded transcription"));
    }

    #[tokio::test]
    async fn missing_payload_becomes_a_trace_message() {
        let state = VersionedState::new_with_user_message("user", "kick off");
        let (ctx, _rx) = ctx();

        let partial = TranscriptionLoaderNode::new()
            .run(state.snapshot(), ctx)
            .await
            .unwrap();

        assert!(partial.extra.is_none());
        let messages = partial.messages.unwrap();
        assert!(messages[0].content.contains("No transcription payload"));
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let state = VersionedState::builder()
            .with_user_message("user", "kick off")
            .with_extra(
                keys::TRANSCRIPTION_DATA,
                json!({
                    "transcription_id": "tr-2",
                    "text": "   ",
                    "metadata": {"original_filename": "a.wav", "model": "m"}
                }),
            )
            .build();
        let (ctx, _rx) = ctx();

        let partial = TranscriptionLoaderNode
            .run(state.snapshot(), ctx)
            .await
            .unwrap();

        let messages = partial.messages.unwrap();
        assert!(messages[0].content.contains("empty"));
    }
}
