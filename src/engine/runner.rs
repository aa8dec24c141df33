// src/engine/runner.rs

//! Stage-by-stage execution of a task plan.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{Id as TaskId, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::state::PlanState;
use crate::errors::KapplyError;
use crate::event::{Event, EventError};
use crate::object::ObjMetadataSet;
use crate::polling::{PollEvent, PollOptions, Poller};
use crate::task::{RunSummary, Stage, Task, TaskContext, action_groups};
use crate::types::{ErrorAggregation, WaitTimeoutBehaviour};

/// Behaviour switches for one run.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Forward poller verdicts to the event stream as `StatusUpdate`s.
    pub emit_status_events: bool,
    pub wait_timeout_behaviour: WaitTimeoutBehaviour,
    pub error_aggregation: ErrorAggregation,
    pub poll: PollOptions,
}

/// How a finished stage affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Continue,
    Abort,
    Cancelled,
}

pub struct TaskRunner {
    poller: Arc<dyn Poller>,
    options: RunnerOptions,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("options", &self.options)
            .finish()
    }
}

impl TaskRunner {
    pub fn new(poller: Arc<dyn Poller>, options: RunnerOptions) -> Self {
        Self { poller, options }
    }

    /// Run `stages` in order and return the final tallies.
    ///
    /// `watched` is the set of objects whose status is polled during the
    /// run. Every event goes to `ctx.events`; the stream closes once the
    /// caller drops its last handle on `ctx`.
    pub async fn run(
        &self,
        ctx: Arc<TaskContext>,
        stages: Vec<Stage>,
        watched: ObjMetadataSet,
    ) -> RunSummary {
        let groups = action_groups(&stages);
        let mut plan = PlanState::new(groups.iter().map(|g| g.name.as_str()));
        info!(tasks = groups.len(), "run started");
        ctx.events.send(Event::Init { action_groups: groups }).await;

        let poll_cancel = ctx.cancel.child_token();
        let forwarder = self.start_poller(&ctx, &poll_cancel, watched);

        let mut outcome = StageOutcome::Continue;
        for stage in stages {
            if ctx.cancel.is_cancelled() {
                outcome = StageOutcome::Cancelled;
            }
            if outcome != StageOutcome::Continue {
                break;
            }
            outcome = self.run_stage(&ctx, &mut plan, stage).await;
        }
        if outcome == StageOutcome::Continue && ctx.cancel.is_cancelled() {
            outcome = StageOutcome::Cancelled;
        }

        poll_cancel.cancel();
        if let Some(forwarder) = forwarder
            && let Err(err) = forwarder.await
        {
            warn!(error = %err, "status forwarder did not shut down cleanly");
        }

        plan.skip_pending();
        let summary = ctx.counters().snapshot();

        match outcome {
            StageOutcome::Cancelled => {
                info!("run cancelled");
                ctx.events.send(Event::error(&KapplyError::Cancelled, true)).await;
            }
            StageOutcome::Abort => info!(?summary, "run aborted"),
            StageOutcome::Continue => {
                if self.options.error_aggregation == ErrorAggregation::AnyError && summary.failures() > 0 {
                    let err = KapplyError::RunFailed {
                        failures: summary.failures(),
                    };
                    ctx.events.send(Event::error(&err, false)).await;
                }
                info!(?summary, "run finished");
            }
        }

        summary
    }

    /// Start the poller unless there is nothing to watch or nothing would
    /// consume its output.
    fn start_poller(
        &self,
        ctx: &Arc<TaskContext>,
        cancel: &CancellationToken,
        watched: ObjMetadataSet,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if watched.is_empty() || ctx.dry_run.is_dry_run() {
            debug!("status poller not started");
            return None;
        }
        debug!(objects = watched.len(), "starting status poller");
        let rx = self.poller.poll(cancel.clone(), watched, self.options.poll.clone());
        Some(tokio::spawn(forward_statuses(
            Arc::clone(ctx),
            cancel.clone(),
            rx,
            self.options.emit_status_events,
        )))
    }

    async fn run_stage(&self, ctx: &Arc<TaskContext>, plan: &mut PlanState, stage: Stage) -> StageOutcome {
        for task in &stage.tasks {
            plan.start(task.name());
            ctx.events
                .send(Event::ActionGroupStart {
                    group: task.name().to_string(),
                    action: task.action(),
                })
                .await;
        }

        let mut running = JoinSet::new();
        let mut names: HashMap<TaskId, String> = HashMap::new();
        for task in stage.tasks.iter().cloned() {
            let ctx = Arc::clone(ctx);
            let name = task.name().to_string();
            let handle = running.spawn(async move {
                let result = task.execute(&ctx).await;
                (task, result)
            });
            names.insert(handle.id(), name);
        }

        let mut outcome = StageOutcome::Continue;
        while let Some(joined) = running.join_next_with_id().await {
            let (task, result) = match joined {
                Ok((_, done)) => done,
                Err(err) => {
                    let name = names.remove(&err.id()).unwrap_or_default();
                    error!(task = %name, error = %err, "task panicked or was aborted");
                    plan.fail(&name);
                    ctx.events
                        .send(Event::error(&KapplyError::Other(err.into()), true))
                        .await;
                    outcome = StageOutcome::Abort;
                    continue;
                }
            };
            match result {
                Ok(()) => {
                    debug!(task = %task.name(), "task completed");
                    plan.complete(task.name());
                }
                Err(err) => {
                    plan.fail(task.name());
                    outcome = outcome.max_with(self.classify(ctx, &task, &err).await);
                }
            }
        }

        // A fatal error is the last thing a stream carries.
        if outcome != StageOutcome::Continue {
            return outcome;
        }

        for task in &stage.tasks {
            ctx.events
                .send(Event::ActionGroupFinish {
                    group: task.name().to_string(),
                    action: task.action(),
                })
                .await;
        }
        outcome
    }

    /// Report a task error and decide whether the run goes on.
    async fn classify(&self, ctx: &TaskContext, task: &Task, err: &KapplyError) -> StageOutcome {
        if matches!(err, KapplyError::Cancelled) {
            debug!(task = %task.name(), "task stopped by cancellation");
            return StageOutcome::Cancelled;
        }

        let abort = err.is_fatal()
            || (err.is_timeout() && self.options.wait_timeout_behaviour == WaitTimeoutBehaviour::Abort);
        if abort {
            error!(task = %task.name(), error = %err, "task failed; aborting run");
        } else {
            warn!(task = %task.name(), error = %err, "task failed");
        }
        ctx.events.send(Event::error(err, abort)).await;

        if abort {
            StageOutcome::Abort
        } else {
            StageOutcome::Continue
        }
    }
}

impl StageOutcome {
    /// Cancellation outranks abort, which outranks continuing.
    fn max_with(self, other: StageOutcome) -> StageOutcome {
        match (self, other) {
            (StageOutcome::Cancelled, _) | (_, StageOutcome::Cancelled) => StageOutcome::Cancelled,
            (StageOutcome::Abort, _) | (_, StageOutcome::Abort) => StageOutcome::Abort,
            _ => StageOutcome::Continue,
        }
    }
}

/// Feed poller output to wait tasks and, optionally, to the event stream.
async fn forward_statuses(
    ctx: Arc<TaskContext>,
    cancel: CancellationToken,
    mut rx: mpsc::Receiver<PollEvent>,
    emit_status_events: bool,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Some(PollEvent::ResourceUpdate(status)) => {
                ctx.status.publish(status.clone());
                if emit_status_events {
                    send_unless_cancelled(&ctx, &cancel, Event::StatusUpdate(status)).await;
                }
            }
            // Wait tasks need the newer generation; the event stream does not.
            Some(PollEvent::GenerationUpdate(status)) => ctx.status.publish(status),
            Some(PollEvent::Error { id, kind, message }) => {
                let event = Event::Error {
                    error: EventError {
                        kind,
                        message: format!("{id}: {message}"),
                    },
                    fatal: false,
                };
                send_unless_cancelled(&ctx, &cancel, event).await;
            }
            Some(PollEvent::Sync) => debug!("status poller synced"),
            None => break,
        }
    }
    debug!("status forwarder stopped");
}

async fn send_unless_cancelled(ctx: &TaskContext, cancel: &CancellationToken, event: Event) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = ctx.events.send(event) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::dag::DependencyGraph;
    use crate::engine::TaskState;
    use crate::errors::Result;
    use crate::event::EventSender;
    use crate::inventory::{InventoryClient, InventoryInfo, InventoryPolicy};
    use crate::polling::StatusPoller;
    use crate::status::StatusComputer;
    use crate::task::{InventoryAddTask, TaskContextParts};
    use crate::types::DryRunStrategy;
    use async_trait::async_trait;

    struct PanickingInventory;

    #[async_trait]
    impl InventoryClient for PanickingInventory {
        async fn load(&self, _inv: &InventoryInfo) -> Result<Option<ObjMetadataSet>> {
            Ok(None)
        }

        async fn replace(&self, _inv: &InventoryInfo, _objects: &ObjMetadataSet) -> Result<()> {
            panic!("inventory storage blew up");
        }

        async fn delete(&self, _inv: &InventoryInfo) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_task_is_marked_failed_and_aborts() {
        let cluster = Arc::new(MemoryCluster::new());
        let (tx, mut rx) = mpsc::channel(16);
        let ctx = Arc::new(TaskContext::new(TaskContextParts {
            cluster: cluster.clone(),
            inventory_client: Arc::new(PanickingInventory),
            inventory: InventoryInfo::new("inventory", "default", "test-inventory-id"),
            policy: InventoryPolicy::default(),
            dry_run: DryRunStrategy::None,
            parallelism: 1,
            graph: DependencyGraph::default(),
            events: EventSender::new(tx),
            cancel: CancellationToken::new(),
        }));
        let runner = TaskRunner::new(
            Arc::new(StatusPoller::new(cluster, StatusComputer::default())),
            RunnerOptions::default(),
        );

        let stage = Stage::single(Task::InventoryAdd(InventoryAddTask {
            previous: ObjMetadataSet::new(),
            desired: ObjMetadataSet::new(),
        }));
        let mut plan = PlanState::new(["inventory-add-0"]);
        let outcome = runner.run_stage(&ctx, &mut plan, stage).await;
        drop(ctx);

        assert_eq!(outcome, StageOutcome::Abort);
        assert_eq!(plan.state("inventory-add-0"), Some(TaskState::Failed));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(Event::ActionGroupStart { .. })));
        assert!(matches!(events.last(), Some(Event::Error { fatal: true, .. })));
        assert_eq!(events.len(), 2);
    }
}
