// src/task/wait.rs

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{KapplyError, Result};
use crate::event::{ActuationStatus, Event, WaitStatus};
use crate::object::ObjMetadata;
use crate::polling::ResourceStatus;
use crate::status::Status;
use crate::task::tracker::Tally;
use crate::task::{Delivery, TaskContext};

/// Status a wait task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// After apply: the object is reconciled.
    Current,
    /// After prune/delete: the object is gone.
    NotFound,
}

/// Block until every object reaches `condition` or `timeout` elapses.
#[derive(Debug, Clone)]
pub struct WaitTask {
    pub name: String,
    pub ids: Vec<ObjMetadata>,
    pub condition: WaitCondition,
    /// `None` waits until satisfied or cancelled.
    pub timeout: Option<Duration>,
}

enum Verdict {
    Satisfied,
    Failed,
    Keep,
}

impl WaitTask {
    pub async fn execute(&self, ctx: &Arc<TaskContext>) -> Result<()> {
        let mut pending: BTreeSet<ObjMetadata> = BTreeSet::new();
        for id in &self.ids {
            if self.was_actuated(ctx, id) {
                pending.insert(id.clone());
            } else {
                self.finish(ctx, id.clone(), WaitStatus::Skipped).await;
            }
        }
        for id in &pending {
            self.emit(ctx, id.clone(), WaitStatus::Pending).await;
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut subscription = ctx.status.subscribe(pending.iter().cloned());

        while !pending.is_empty() {
            match subscription.next_until(deadline, &ctx.cancel).await {
                Delivery::Status(status) => {
                    if !pending.contains(&status.id) {
                        continue;
                    }
                    match self.judge(ctx, &status) {
                        Verdict::Satisfied => {
                            pending.remove(&status.id);
                            info!(task = %self.name, id = %status.id, status = %status.status, "reconciled");
                            self.finish(ctx, status.id, WaitStatus::Successful).await;
                        }
                        Verdict::Failed => {
                            pending.remove(&status.id);
                            warn!(task = %self.name, id = %status.id, message = %status.message, "reconcile failed");
                            self.finish(ctx, status.id, WaitStatus::Failed).await;
                        }
                        Verdict::Keep => {
                            debug!(task = %self.name, id = %status.id, status = %status.status, "still waiting");
                        }
                    }
                }
                Delivery::TimedOut => {
                    let count = pending.len();
                    warn!(task = %self.name, pending = count, "wait timed out");
                    for id in std::mem::take(&mut pending) {
                        self.finish(ctx, id, WaitStatus::Timeout).await;
                    }
                    return Err(KapplyError::WaitTimeout {
                        task: self.name.clone(),
                        timeout: self.timeout.unwrap_or_default(),
                        pending: count,
                    });
                }
                Delivery::Cancelled => return Err(KapplyError::Cancelled),
                Delivery::Closed => {
                    return Err(KapplyError::Cluster(format!(
                        "status feed closed with {} object(s) still pending in {}",
                        pending.len(),
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Only objects whose apply or removal went through are worth waiting for.
    fn was_actuated(&self, ctx: &TaskContext, id: &ObjMetadata) -> bool {
        let tracker = ctx.tracker();
        let status = match self.condition {
            WaitCondition::Current => tracker.apply_status(id),
            WaitCondition::NotFound => tracker.removal_status(id),
        };
        status == Some(ActuationStatus::Successful)
    }

    fn judge(&self, ctx: &TaskContext, status: &ResourceStatus) -> Verdict {
        match self.condition {
            WaitCondition::Current => {
                // A read from before our apply says nothing about it.
                let applied = ctx.tracker().applied_generation(&status.id);
                if let (Some(seen), Some(applied)) = (status.generation, applied)
                    && seen < applied
                {
                    return Verdict::Keep;
                }
                match status.status {
                    Status::Current => Verdict::Satisfied,
                    Status::Failed => Verdict::Failed,
                    _ => Verdict::Keep,
                }
            }
            WaitCondition::NotFound => match status.status {
                Status::NotFound => Verdict::Satisfied,
                _ => Verdict::Keep,
            },
        }
    }

    async fn finish(&self, ctx: &TaskContext, id: ObjMetadata, status: WaitStatus) {
        ctx.tracker().record_reconcile(id.clone(), status);
        ctx.tally(Tally::Reconcile(status));
        self.emit(ctx, id, status).await;
    }

    async fn emit(&self, ctx: &TaskContext, id: ObjMetadata, status: WaitStatus) {
        ctx.events
            .send(Event::Wait {
                group: self.name.clone(),
                id,
                status,
            })
            .await;
    }
}
