//! Postgres checkpointer integration tests.
//!
//! These need a reachable database; set DATABASE_URL and run with
//! `cargo test --features postgres -- --ignored`.

#![cfg(feature = "postgres")]

use threadloom::channels::Channel;
use threadloom::runtimes::{Checkpointer, PostgresCheckpointer};
use threadloom::state::VersionedState;

mod common;
use common::state_with_user;

async fn connect() -> PostgresCheckpointer {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
    PostgresCheckpointer::connect(&url)
        .await
        .expect("connect to postgres")
}

fn unique_session(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "needs a postgres instance"]
async fn save_and_load_round_trips_state() {
    let cp = connect().await;
    let session = unique_session("pg-roundtrip");

    let state = state_with_user("durable hello");
    let checkpoint = threadloom::runtimes::Checkpoint {
        session_id: session.clone(),
        step: 1,
        state,
        frontier: vec![threadloom::types::NodeKind::End],
        versions_seen: rustc_hash::FxHashMap::default(),
        concurrency_limit: 4,
        created_at: Some(chrono::Utc::now()),
        ran_nodes: vec![],
        skipped_nodes: vec![],
        updated_channels: vec!["chat_history".into()],
    };

    cp.save(checkpoint).await.unwrap();
    let loaded = cp.load_latest(&session).await.unwrap().unwrap();

    assert_eq!(loaded.step, 1);
    assert_eq!(
        loaded.state.chat_history.snapshot()[0].content,
        "durable hello"
    );

    cp.delete_session(&session).await.unwrap();
}

#[tokio::test]
#[ignore = "needs a postgres instance"]
async fn history_lists_newest_first() {
    let cp = connect().await;
    let session = unique_session("pg-history");

    for step in 1..=3 {
        let checkpoint = threadloom::runtimes::Checkpoint {
            session_id: session.clone(),
            step,
            state: VersionedState::default(),
            frontier: vec![],
            versions_seen: rustc_hash::FxHashMap::default(),
            concurrency_limit: 1,
            created_at: Some(chrono::Utc::now()),
            ran_nodes: vec![],
            skipped_nodes: vec![],
            updated_channels: vec![],
        };
        cp.save(checkpoint).await.unwrap();
    }

    let history = cp.list_checkpoints(&session, 2).await.unwrap();
    assert_eq!(history.iter().map(|c| c.step).collect::<Vec<_>>(), vec![3, 2]);

    cp.delete_session(&session).await.unwrap();
    assert!(cp.load_latest(&session).await.unwrap().is_none());
}
