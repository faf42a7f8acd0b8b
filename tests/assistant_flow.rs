use std::sync::Arc;

use serde_json::json;

use threadloom::assistant::{Assistant, AssistantError};
use threadloom::completion::ScriptedCompletion;
use threadloom::models::ProcessingStatus;
use threadloom::nodes::processing::MemoryResultsSink;
use threadloom::runtimes::RuntimeConfig;

async fn assistant_with(completion: ScriptedCompletion) -> (Assistant, Arc<MemoryResultsSink>) {
    let sink = Arc::new(MemoryResultsSink::new());
    let assistant = Assistant::initialize(
        Arc::new(completion),
        sink.clone(),
        RuntimeConfig::default(),
    )
    .await
    .unwrap();
    (assistant, sink)
}

fn full_turn_scripts() -> ScriptedCompletion {
    ScriptedCompletion::new()
        .script(
            "IntentionSeeker",
            json!({"intention": "summarize", "inquiry": "summarize the standup"}),
        )
        .script(
            "Planner",
            json!({"tasks": [{"description": "gather the standup notes"}]}),
        )
        .script(
            "TaskOrchestrator",
            json!({
                "task": "gather the standup notes",
                "objective": "collect raw notes",
                "orientations": "look at the thread",
                "chosen_agent": "DataCollector"
            }),
        )
        .script(
            "DataCollector",
            json!({"data_collected": "beta ships next week", "notes": ""}),
        )
        .script(
            "Touchpoint",
            json!({"answer": "The standup decided to ship the beta next week."}),
        )
}

#[tokio::test]
async fn a_full_turn_dispatches_the_task_and_answers() {
    let (assistant, _sink) = assistant_with(full_turn_scripts()).await;

    let reply = assistant
        .process("summarize the standup", "t1")
        .await
        .unwrap();

    assert!(!reply.fallback_used);
    assert!(reply.response.contains("ship the beta"));
    assert_eq!(reply.thread_id, "t1");
    assert_eq!(reply.message_count, 2);

    // The drained task list and the collected data are in the saved state.
    let thread = assistant.memory().create_thread_config("t1", "", None);
    let state = assistant.memory().get_thread_state(&thread).await.unwrap();
    let snapshot = state.snapshot();
    assert!(snapshot.tasks.is_empty());
    assert_eq!(snapshot.collected.len(), 1);
}

#[tokio::test]
async fn a_failed_turn_still_answers_through_the_fallback() {
    // Only the fallback touchpoint is scripted; the main graph dies on the
    // intent seeker's first completion call.
    let scripts =
        ScriptedCompletion::new().script("Touchpoint", json!({"answer": "Best effort."}));
    let (assistant, _sink) = assistant_with(scripts).await;

    let reply = assistant.process("anything", "t2").await.unwrap();

    assert!(reply.fallback_used);
    assert!(!reply.response.is_empty());
}

#[tokio::test]
async fn a_dead_fallback_is_a_hard_error_not_a_second_fallback() {
    // Nothing scripted at all: the main graph fails, and so does the
    // fallback touchpoint. The caller gets the error instead of a loop.
    let (assistant, _sink) = assistant_with(ScriptedCompletion::new()).await;

    let err = assistant.process("anything", "t3").await.unwrap_err();

    assert!(matches!(err, AssistantError::Fallback { .. }));
}

#[tokio::test]
async fn reset_thread_state_starts_the_thread_over() {
    let scripts = full_turn_scripts()
        .script(
            "IntentionSeeker",
            json!({"intention": "greet", "inquiry": "say hello"}),
        )
        .script("Planner", json!({"tasks": []}))
        .script("Touchpoint", json!({"answer": "Hello, fresh start!"}));
    let (assistant, _sink) = assistant_with(scripts).await;

    assistant.process("summarize the standup", "t4").await.unwrap();

    let thread = assistant.memory().create_thread_config("t4", "", None);
    assistant.memory().reset_thread_state(&thread).await.unwrap();
    let state = assistant.memory().get_thread_state(&thread).await.unwrap();
    assert!(state.is_empty());

    // The next turn is a brand-new conversation: two history entries only.
    let reply = assistant.process("hello", "t4").await.unwrap();
    assert_eq!(reply.message_count, 2);
}

#[tokio::test]
async fn transcription_jobs_do_not_touch_the_conversational_lineage() {
    let scripts = full_turn_scripts()
        .script(
            "ProcessingTranscriptionAnalyzer",
            json!({
                "summary": "Planning call.",
                "key_topics": ["planning"],
                "sentiment": "neutral",
                "main_themes": [],
                "important_quotes": [],
                "technical_terms": []
            }),
        )
        .script(
            "ProcessingInsightExtractor",
            json!({
                "key_insights": ["timeline is firm"],
                "action_items": ["cut the branch"],
                "decisions": [],
                "questions": [],
                "follow_ups": []
            }),
        );
    let (assistant, sink) = assistant_with(scripts).await;

    assistant.process("summarize the standup", "t5").await.unwrap();

    let result = assistant
        .process_transcription(
            "t5",
            "tr-1",
            json!({
                "text": "We locked the timeline.",
                "metadata": {"original_filename": "call.wav", "model": "whisper-large"}
            }),
        )
        .await
        .unwrap();

    assert_eq!(result.status, ProcessingStatus::Completed);
    assert!(sink.get("tr-1").is_some());

    // The conversation thread still holds only conversational history.
    let thread = assistant.memory().create_thread_config("t5", "", None);
    let state = assistant.memory().get_thread_state(&thread).await.unwrap();
    let snapshot = state.snapshot();
    assert!(!snapshot.extra.contains_key("analysis"));
    assert_eq!(snapshot.chat_history.len(), 2);
}
