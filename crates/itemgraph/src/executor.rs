//! Execution engine - applies items on a fixed pool of worker threads
//!
//! The calling thread coordinates: it owns the [`ItemQueue`], hands ready
//! items to idle workers and turns their results into queue mutations.
//! Workers never touch the queue. A finished job doubles as the worker's
//! request for more work.

use crate::apply::{SkipPolicy, apply_item};
use crate::context::{ApplyContext, CommandRunner, ProgressCallback};
use crate::error::RunError;
use crate::graph::{GraphNode, ItemGraph};
use crate::queue::ItemQueue;
use crate::types::{ApplyOutcome, ExecuteOptions, ItemResult, RunReport, SkipReason};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// One item handed to a worker
struct Job<'g> {
    node: &'g GraphNode,
    has_been_triggered: bool,
}

/// A worker finished its job and is idle again
struct Done {
    worker: usize,
    item_id: String,
    outcome: ApplyOutcome,
    duration: Duration,
}

/// Apply every item of the graph
///
/// Results reach `progress` as they become available: an item's own
/// result first, then the dependents skipped because of it. Per-item
/// failures are part of the report; only a dependency loop aborts.
///
/// # Errors
/// [`RunError::DependencyLoop`] if items remain blocked once no work is
/// left, [`RunError::Dependency`] for invalid skip or lock selectors, and
/// [`RunError::WorkerPool`] if worker threads cannot be started.
pub fn execute<P>(
    graph: &ItemGraph,
    options: &ExecuteOptions,
    runner: &dyn CommandRunner,
    progress: &mut P,
) -> Result<RunReport, RunError>
where
    P: ProgressCallback + ?Sized,
{
    let started = Instant::now();
    let policy = SkipPolicy::new(graph, options)?;
    let workers = options.workers.max(1);

    log::info!(
        "applying {} items on {} with {workers} workers",
        graph.len(),
        graph.node_name
    );
    progress.on_run_start(graph.len());

    let mut queue = ItemQueue::new(graph);
    let mut results = Vec::with_capacity(graph.len());

    thread::scope(|scope| -> Result<(), RunError> {
        let (done_tx, done_rx) = unbounded::<Done>();
        let mut job_txs = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (job_tx, job_rx) = bounded::<Job>(1);
            let done_tx = done_tx.clone();
            let policy = &policy;
            thread::Builder::new()
                .name(format!("worker-{worker}"))
                .spawn_scoped(scope, move || {
                    worker_loop(worker, graph, policy, runner, &job_rx, &done_tx);
                })
                .map_err(|e| RunError::WorkerPool(format!("failed to start worker: {e}")))?;
            job_txs.push(job_tx);
        }
        drop(done_tx);

        coordinate(&mut queue, &job_txs, &done_rx, &mut results, progress)
    })?;

    if !queue.is_empty() {
        let items: Vec<String> = queue.blocked_ids().into_iter().map(String::from).collect();
        log::warn!("dependency loop among {}", items.join(", "));
        return Err(RunError::DependencyLoop { items });
    }

    let report = RunReport {
        results,
        duration: started.elapsed(),
    };
    let summary = report.summary();
    log::info!(
        "run finished in {:.1}s: {} ok, {} fixed, {} actions, {} skipped, {} failed",
        report.duration.as_secs_f64(),
        summary.ok,
        summary.fixed,
        summary.actions,
        summary.skipped,
        summary.failed
    );
    Ok(report)
}

/// Control loop; returns once no worker is busy and nothing is ready
fn coordinate<'g, P>(
    queue: &mut ItemQueue<'g>,
    job_txs: &[Sender<Job<'g>>],
    done_rx: &Receiver<Done>,
    results: &mut Vec<ItemResult>,
    progress: &mut P,
) -> Result<(), RunError>
where
    P: ProgressCallback + ?Sized,
{
    let mut idle: Vec<usize> = (0..job_txs.len()).rev().collect();
    let mut busy = 0usize;

    loop {
        while let Some(&worker) = idle.last() {
            let Some(node) = queue.pop() else {
                break;
            };
            idle.pop();
            progress.on_item_start(&node.id);
            let job = Job {
                node,
                has_been_triggered: queue.has_been_triggered(&node.id),
            };
            job_txs[worker]
                .send(job)
                .map_err(|_| RunError::WorkerPool(format!("worker {worker} is gone")))?;
            busy += 1;
        }

        if busy == 0 {
            return Ok(());
        }

        let done = done_rx
            .recv()
            .map_err(|_| RunError::WorkerPool("all workers are gone".to_string()))?;
        busy -= 1;
        idle.push(done.worker);
        record(queue, done, results, progress);
    }
}

/// Feed a result back into the queue and report it plus its cascade
fn record<P>(
    queue: &mut ItemQueue,
    done: Done,
    results: &mut Vec<ItemResult>,
    progress: &mut P,
) where
    P: ProgressCallback + ?Sized,
{
    let id = done.item_id;
    let (cascaded, reason) = match &done.outcome {
        ApplyOutcome::Failed { error } => {
            log::warn!("{id} failed: {error}");
            (queue.item_failed(&id), SkipReason::DependencyFailed)
        }
        ApplyOutcome::Skipped { reason } => {
            log::debug!("{id} skipped: {reason}");
            (queue.item_skipped(&id), reason.cascaded())
        }
        outcome => {
            if outcome.is_change() {
                queue.item_fixed(&id);
            } else {
                queue.item_ok(&id);
            }
            (Vec::new(), SkipReason::DependencySkipped)
        }
    };

    let own = ItemResult {
        item_id: id.clone(),
        outcome: done.outcome,
        duration: done.duration,
    };
    progress.on_item_complete(&own);
    results.push(own);

    for skipped in cascaded {
        log::warn!("skipping {skipped} because {id} did not succeed ({reason})");
        let result = ItemResult {
            item_id: skipped,
            outcome: ApplyOutcome::skipped(reason),
            duration: Duration::ZERO,
        };
        progress.on_item_complete(&result);
        results.push(result);
    }
}

fn worker_loop(
    worker: usize,
    graph: &ItemGraph,
    policy: &SkipPolicy,
    runner: &dyn CommandRunner,
    jobs: &Receiver<Job>,
    done: &Sender<Done>,
) {
    let ctx = ApplyContext::new(runner, &graph.node_name);
    for job in jobs {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            apply_item(graph, job.node, job.has_been_triggered, policy, &ctx)
        }))
        .unwrap_or_else(|payload| {
            ApplyOutcome::failed(format!("panicked: {}", panic_message(payload.as_ref())))
        });
        let result = Done {
            worker,
            item_id: job.node.id.clone(),
            outcome,
            duration: started.elapsed(),
        };
        if done.send(result).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::deps::prepare_dependencies;
    use crate::item::{BoxedItem, CannedActionSpec};
    use crate::node::Node;
    use crate::testing::{Journal, ScriptedRunner, TestItem};
    use crate::types::SoftLock;

    fn graph(items: Vec<TestItem>) -> ItemGraph {
        let items = items
            .into_iter()
            .map(|i| Box::new(i) as BoxedItem)
            .collect();
        prepare_dependencies(&Node::new("node1"), items).unwrap()
    }

    fn run(graph: &ItemGraph, options: &ExecuteOptions) -> Result<RunReport, RunError> {
        let runner = ScriptedRunner::succeeding(["restart foo"]);
        execute(graph, options, &runner, &mut NoProgress)
    }

    fn outcome<'a>(report: &'a RunReport, id: &str) -> &'a ApplyOutcome {
        &report.get(id).unwrap().outcome
    }

    fn position(report: &RunReport, id: &str) -> usize {
        report.results.iter().position(|r| r.item_id == id).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        total: usize,
        started: Vec<String>,
        completed: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_run_start(&mut self, total: usize) {
            self.total = total;
        }

        fn on_item_start(&mut self, id: &str) {
            self.started.push(id.to_string());
        }

        fn on_item_complete(&mut self, result: &ItemResult) {
            self.completed.push(result.item_id.clone());
        }
    }

    #[test]
    fn test_dependencies_run_first() {
        let journal = Journal::new();
        let g = graph(vec![
            TestItem::new("file:/a").needs(["file:/b"]).journal(&journal),
            TestItem::new("file:/b").incorrect().journal(&journal),
        ]);
        let report = run(&g, &ExecuteOptions::default()).unwrap();
        assert!(journal.position("file:/b").unwrap() < journal.position("file:/a").unwrap());
        assert_eq!(outcome(&report, "file:/b"), &ApplyOutcome::Fixed);
        assert_eq!(outcome(&report, "file:/a"), &ApplyOutcome::Ok);
        assert!(report.summary().is_success());
    }

    #[test]
    fn test_fixed_item_triggers_canned_action() {
        let g = graph(vec![
            TestItem::new("pkg:foo")
                .incorrect()
                .canned("restart", CannedActionSpec::new("restart foo"))
                .triggers(["pkg:foo:restart"]),
        ]);
        let report = run(&g, &ExecuteOptions::default()).unwrap();
        assert_eq!(outcome(&report, "pkg:foo"), &ApplyOutcome::Fixed);
        assert_eq!(
            outcome(&report, "pkg:foo:restart"),
            &ApplyOutcome::ActionSucceeded
        );
    }

    #[test]
    fn test_action_success_fires_triggers() {
        let g = graph(vec![
            TestItem::new("action:first")
                .action()
                .triggers(["action:second"]),
            TestItem::new("action:second").action().triggered(),
        ]);
        let report = run(&g, &ExecuteOptions::default()).unwrap();
        assert_eq!(outcome(&report, "action:first"), &ApplyOutcome::ActionSucceeded);
        assert_eq!(outcome(&report, "action:second"), &ApplyOutcome::ActionSucceeded);
        assert_eq!(report.summary().total(), 2);
    }

    #[test]
    fn test_untriggered_action_is_skipped() {
        let g = graph(vec![
            TestItem::new("pkg:foo")
                .canned("restart", CannedActionSpec::new("restart foo"))
                .triggers(["pkg:foo:restart"]),
            TestItem::new("file:/after").needs(["pkg:foo:restart"]),
        ]);
        let report = run(&g, &ExecuteOptions::default()).unwrap();
        assert_eq!(outcome(&report, "pkg:foo"), &ApplyOutcome::Ok);
        assert_eq!(
            outcome(&report, "pkg:foo:restart"),
            &ApplyOutcome::skipped(SkipReason::NotTriggered)
        );
        // triggered items do not cascade by default
        assert_eq!(outcome(&report, "file:/after"), &ApplyOutcome::Ok);
    }

    #[test]
    fn test_dependency_loop() {
        let g = graph(vec![
            TestItem::new("type1:x").needs(["type1:y"]),
            TestItem::new("type1:y").needs(["type1:x"]),
        ]);
        match run(&g, &ExecuteOptions::default()) {
            Err(RunError::DependencyLoop { items }) => {
                assert_eq!(items, vec!["type1:x", "type1:y"]);
            }
            other => panic!("expected dependency loop, got {other:?}"),
        }
    }

    #[test]
    fn test_blocked_types_never_overlap() {
        let journal = Journal::new();
        let g = graph(vec![
            TestItem::new("type1:a")
                .blocks(["type1"])
                .incorrect()
                .delay_ms(30)
                .journal(&journal),
            TestItem::new("type1:b")
                .blocks(["type1"])
                .incorrect()
                .delay_ms(30)
                .journal(&journal),
        ]);
        let a = g.get("type1:a").unwrap();
        let b = g.get("type1:b").unwrap();
        let ordered = [
            a.direct_deps.contains("type1:b"),
            b.direct_deps.contains("type1:a"),
        ];
        assert_eq!(ordered.iter().filter(|o| **o).count(), 1);

        let options = ExecuteOptions {
            workers: 8,
            ..ExecuteOptions::default()
        };
        let report = run(&g, &options).unwrap();
        assert_eq!(report.summary().fixed, 2);
        assert_eq!(journal.max_in_flight("type1"), 1);
    }

    #[test]
    fn test_independent_items_run_in_parallel() {
        let journal = Journal::new();
        let items = (0..4)
            .map(|i| {
                TestItem::new(&format!("file:/{i}"))
                    .incorrect()
                    .delay_ms(100)
                    .journal(&journal)
            })
            .collect();
        let g = graph(items);
        let report = run(&g, &ExecuteOptions::default()).unwrap();
        assert_eq!(report.summary().fixed, 4);
        assert!(journal.max_in_flight("file") > 1);
    }

    #[test]
    fn test_failure_cascades_in_order() {
        let journal = Journal::new();
        let g = graph(vec![
            TestItem::new("file:/a").needs(["file:/b"]).incorrect().journal(&journal),
            TestItem::new("file:/b")
                .incorrect()
                .fix_error("boom")
                .journal(&journal),
        ]);
        let report = run(&g, &ExecuteOptions::default()).unwrap();
        assert!(outcome(&report, "file:/b").is_failure());
        assert_eq!(
            outcome(&report, "file:/a"),
            &ApplyOutcome::skipped(SkipReason::DependencyFailed)
        );
        assert!(position(&report, "file:/b") < position(&report, "file:/a"));
        assert_eq!(journal.position("file:/a"), None);
        assert_eq!(report.summary().failed, 1);
    }

    #[test]
    fn test_panic_becomes_failure() {
        let g = graph(vec![
            TestItem::new("file:/bad").incorrect().panics(),
            TestItem::new("file:/good").incorrect(),
        ]);
        let report = run(&g, &ExecuteOptions::default()).unwrap();
        match outcome(&report, "file:/bad") {
            ApplyOutcome::Failed { error } => assert!(error.contains("exploded")),
            other => panic!("expected failure, got {other}"),
        }
        assert_eq!(outcome(&report, "file:/good"), &ApplyOutcome::Fixed);
    }

    #[test]
    fn test_skip_selector_cascades_as_dependency_skipped() {
        let g = graph(vec![
            TestItem::new("file:/a").needs(["pkg:x"]),
            TestItem::new("pkg:x"),
        ]);
        let options = ExecuteOptions {
            skip: vec!["pkg:x".into()],
            ..ExecuteOptions::default()
        };
        let report = run(&g, &options).unwrap();
        assert_eq!(
            outcome(&report, "pkg:x"),
            &ApplyOutcome::skipped(SkipReason::Selected)
        );
        assert_eq!(
            outcome(&report, "file:/a"),
            &ApplyOutcome::skipped(SkipReason::DependencySkipped)
        );
    }

    #[test]
    fn test_soft_lock_cascade() {
        let g = graph(vec![
            TestItem::new("file:/a").needs(["pkg:x"]),
            TestItem::new("pkg:x"),
        ]);
        let options = ExecuteOptions {
            other_soft_locks: vec![SoftLock {
                id: "l1".into(),
                owner: "alice".into(),
                items: vec!["pkg:".into()],
            }],
            ..ExecuteOptions::default()
        };
        let report = run(&g, &options).unwrap();
        assert_eq!(
            outcome(&report, "file:/a"),
            &ApplyOutcome::skipped(SkipReason::DependencySoftLocked)
        );
    }

    #[test]
    fn test_single_worker_and_progress() {
        let g = graph(vec![
            TestItem::new("file:/a").needs(["file:/b"]),
            TestItem::new("file:/b").incorrect(),
            TestItem::new("file:/c").needs(["file:/b"]).incorrect(),
        ]);
        let options = ExecuteOptions {
            workers: 1,
            ..ExecuteOptions::default()
        };
        let runner = ScriptedRunner::default();
        let mut recorder = Recorder::default();
        let report = execute(&g, &options, &runner, &mut recorder).unwrap();
        assert_eq!(recorder.total, 3);
        assert_eq!(recorder.started, vec!["file:/b", "file:/a", "file:/c"]);
        assert_eq!(recorder.completed, recorder.started);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.summary().fixed, 2);
    }

    #[test]
    fn test_empty_graph() {
        let g = graph(Vec::new());
        let report = run(&g, &ExecuteOptions::default()).unwrap();
        assert!(report.results.is_empty());
    }
}
