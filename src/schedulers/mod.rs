//! Superstep scheduling.
//!
//! A superstep runs every node on the current frontier concurrently against
//! the same state snapshot, bounded by the configured concurrency limit.
//! Outputs come back in frontier order regardless of completion order, so a
//! given frontier always produces the same barrier input.
//!
//! The scheduler does not gate nodes on channel versions: a node scheduled
//! onto the frontier runs, full stop. Loop-shaped workflows depend on nodes
//! re-running over state they have already seen.

use futures_util::stream::{self, StreamExt};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::app::FrontierEntry;
use crate::event_bus::Event;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Runs one frontier's worth of nodes per call.
#[derive(Clone, Debug)]
pub struct Scheduler {
    pub concurrency_limit: usize,
}

/// What happened in a superstep: which nodes ran, which were virtual
/// endpoints that got skipped, and the outputs in ran-node order.
#[derive(Debug, Default)]
pub struct SuperstepOutcome {
    pub ran_nodes: Vec<NodeKind>,
    pub skipped_nodes: Vec<NodeKind>,
    pub outputs: Vec<NodePartial>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("frontier references unknown node '{node}'")]
    #[diagnostic(
        code(threadloom::scheduler::unknown_node),
        help("graph compilation validates static edges; dynamic routers must only target registered nodes")
    )]
    UnknownNode { node: String },

    #[error("node '{node}' failed at step {step}")]
    #[diagnostic(code(threadloom::scheduler::node_run))]
    NodeRun {
        node: String,
        step: u64,
        #[source]
        source: NodeError,
    },
}

/// Merge a fan-out overlay into a snapshot clone, honoring each channel's
/// reducer discipline. The result is what one branch sees for one superstep;
/// nothing here touches durable state.
fn overlay_snapshot(base: &StateSnapshot, overlay: &NodePartial) -> StateSnapshot {
    let mut view = base.clone();
    if let Some(ms) = &overlay.chat_history {
        view.chat_history.extend(ms.iter().cloned());
    }
    if let Some(ms) = &overlay.messages {
        view.messages.extend(ms.iter().cloned());
    }
    if let Some(tasks) = &overlay.tasks {
        if tasks.is_empty() {
            view.tasks.clear();
        } else {
            view.tasks.extend(tasks.iter().cloned());
        }
    }
    if let Some(collected) = &overlay.collected {
        if collected.is_empty() {
            view.collected.clear();
        } else {
            view.collected.extend(collected.iter().cloned());
        }
    }
    if let Some(extra) = &overlay.extra {
        for (k, v) in extra {
            view.extra.insert(k.clone(), v.clone());
        }
    }
    if let Some(errs) = &overlay.errors {
        view.errors.extend(errs.iter().cloned());
    }
    view
}

impl Scheduler {
    #[must_use]
    pub fn new(concurrency_limit: usize) -> Self {
        Self { concurrency_limit }
    }

    /// Run every node on the frontier against `snapshot`.
    ///
    /// Fan-out overlays are applied to a per-branch clone of the snapshot
    /// before the node sees it. The first node failure aborts the superstep;
    /// the caller decides whether that becomes a fallback path or a hard
    /// error.
    #[instrument(skip_all, fields(step, frontier = frontier.len()))]
    pub async fn run_superstep(
        &self,
        nodes: &FxHashMap<NodeKind, Arc<dyn Node>>,
        frontier: &[FrontierEntry],
        snapshot: StateSnapshot,
        step: u64,
        remaining_steps: u64,
        event_sender: flume::Sender<Event>,
    ) -> Result<SuperstepOutcome, SchedulerError> {
        let mut ran_nodes: Vec<NodeKind> = Vec::new();
        let mut skipped_nodes: Vec<NodeKind> = Vec::new();
        let mut jobs = Vec::new();

        for entry in frontier {
            if entry.node.is_start() || entry.node.is_end() {
                skipped_nodes.push(entry.node.clone());
                continue;
            }
            let node = nodes
                .get(&entry.node)
                .ok_or_else(|| SchedulerError::UnknownNode {
                    node: entry.node.to_string(),
                })?
                .clone();
            let view = match &entry.overlay {
                Some(overlay) => overlay_snapshot(&snapshot, overlay),
                None => snapshot.clone(),
            };
            let ctx = NodeContext {
                node_id: entry.node.to_string(),
                step,
                remaining_steps,
                event_bus_sender: event_sender.clone(),
            };
            ran_nodes.push(entry.node.clone());
            jobs.push(async move { node.run(view, ctx).await });
        }

        let limit = self.concurrency_limit.max(1);
        // buffered preserves submission order, so outputs line up with
        // ran_nodes no matter which branch finishes first.
        let results: Vec<Result<NodePartial, NodeError>> =
            stream::iter(jobs).buffered(limit).collect().await;

        let mut outputs = Vec::with_capacity(results.len());
        for (node, result) in ran_nodes.iter().zip(results) {
            match result {
                Ok(partial) => outputs.push(partial),
                Err(source) => {
                    return Err(SchedulerError::NodeRun {
                        node: node.to_string(),
                        step,
                        source,
                    });
                }
            }
        }

        Ok(SuperstepOutcome {
            ran_nodes,
            skipped_nodes,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::models::TaskItem;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo(String);

    #[async_trait]
    impl Node for Echo {
        async fn run(
            &self,
            _snapshot: StateSnapshot,
            ctx: NodeContext,
        ) -> Result<NodePartial, NodeError> {
            Ok(NodePartial::new().with_messages(vec![Message::agent(
                &self.0,
                &format!("{} ran at step {}", ctx.node_id, ctx.step),
            )]))
        }
    }

    fn node_map(names: &[&str]) -> FxHashMap<NodeKind, Arc<dyn Node>> {
        let mut map: FxHashMap<NodeKind, Arc<dyn Node>> = FxHashMap::default();
        for name in names {
            map.insert(
                NodeKind::Custom((*name).into()),
                Arc::new(Echo(name.to_string())),
            );
        }
        map
    }

    #[tokio::test]
    async fn outputs_follow_frontier_order() {
        let nodes = node_map(&["a", "b", "c"]);
        let frontier: Vec<FrontierEntry> = ["a", "b", "c"]
            .into_iter()
            .map(|n| FrontierEntry::plain(NodeKind::Custom(n.into())))
            .collect();
        let (tx, _rx) = flume::unbounded();

        let outcome = Scheduler::new(2)
            .run_superstep(&nodes, &frontier, StateSnapshot::default(), 1, 10, tx)
            .await
            .unwrap();

        assert_eq!(outcome.ran_nodes.len(), 3);
        assert_eq!(outcome.outputs.len(), 3);
        for (node, partial) in outcome.ran_nodes.iter().zip(&outcome.outputs) {
            let trace = partial.messages.as_ref().unwrap();
            assert!(trace[0].content.starts_with(&node.to_string()));
        }
    }

    #[tokio::test]
    async fn unknown_frontier_node_is_an_error() {
        let nodes = node_map(&["a"]);
        let frontier = vec![FrontierEntry::plain(NodeKind::Custom("ghost".into()))];
        let (tx, _rx) = flume::unbounded();

        let err = Scheduler::new(1)
            .run_superstep(&nodes, &frontier, StateSnapshot::default(), 1, 10, tx)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownNode { .. }));
    }

    #[test]
    fn overlay_respects_reset_and_merge_disciplines() {
        let mut base = StateSnapshot::default();
        base.tasks.push(TaskItem::new("existing"));
        base.extra.insert("current_task".into(), json!("existing"));

        let drained = overlay_snapshot(
            &base,
            &NodePartial::new().with_tasks(vec![]),
        );
        assert!(drained.tasks.is_empty());

        let overlaid = overlay_snapshot(
            &base,
            &NodePartial::new().with_extra(crate::utils::collections::extra_map_from([(
                "current_task",
                json!("branch"),
            )])),
        );
        assert_eq!(overlaid.extra_str("current_task"), Some("branch"));
        assert_eq!(base.extra_str("current_task"), Some("existing"));
    }
}
