// src/task/mod.rs

//! Units of work in a run.
//!
//! - [`inventory`]: add to, set, or delete the ownership record.
//! - [`apply`]: apply one dependency layer.
//! - [`remove`]: prune or delete one dependency layer.
//! - [`wait`]: block until objects reach a status.
//! - [`builder`]: assemble tasks into stages.
//! - [`context`] / [`tracker`]: shared run state.

pub mod apply;
pub mod builder;
pub mod context;
pub mod inventory;
pub mod remove;
pub mod tracker;
pub mod wait;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::errors::{KapplyError, Result};
use crate::event::ActionKind;
use crate::object::ObjMetadata;

pub use apply::ApplyTask;
pub use builder::{Stage, TaskQueueBuilder, action_groups};
pub use context::{Delivery, StatusFeed, StatusSubscription, TaskContext, TaskContextParts};
pub use inventory::{InventoryAddTask, InventoryDeleteOrUpdateTask, InventorySetTask};
pub use remove::{RemovalKind, RemoveTask};
pub use tracker::{ObjectTracker, RunCounters, RunSummary, Tally};
pub use wait::{WaitCondition, WaitTask};

#[derive(Debug, Clone)]
pub enum Task {
    InventoryAdd(InventoryAddTask),
    InventorySet(InventorySetTask),
    InventoryDeleteOrUpdate(InventoryDeleteOrUpdateTask),
    Apply(ApplyTask),
    Remove(RemoveTask),
    Wait(WaitTask),
}

impl Task {
    pub fn name(&self) -> &str {
        match self {
            Task::InventoryAdd(_) => inventory::INVENTORY_ADD,
            Task::InventorySet(_) => inventory::INVENTORY_SET,
            Task::InventoryDeleteOrUpdate(_) => inventory::INVENTORY_DELETE_OR_UPDATE,
            Task::Apply(t) => &t.name,
            Task::Remove(t) => &t.name,
            Task::Wait(t) => &t.name,
        }
    }

    pub fn action(&self) -> ActionKind {
        match self {
            Task::InventoryAdd(_) | Task::InventorySet(_) | Task::InventoryDeleteOrUpdate(_) => {
                ActionKind::Inventory
            }
            Task::Apply(_) => ActionKind::Apply,
            Task::Remove(t) => t.action(),
            Task::Wait(_) => ActionKind::Wait,
        }
    }

    /// Objects this task acts on (empty for inventory tasks).
    pub fn identifiers(&self) -> Vec<ObjMetadata> {
        match self {
            Task::InventoryAdd(_) | Task::InventorySet(_) | Task::InventoryDeleteOrUpdate(_) => {
                Vec::new()
            }
            Task::Apply(t) => t.identifiers(),
            Task::Remove(t) => t.ids.clone(),
            Task::Wait(t) => t.ids.clone(),
        }
    }

    pub async fn execute(&self, ctx: &Arc<TaskContext>) -> Result<()> {
        match self {
            Task::InventoryAdd(t) => t.execute(ctx).await,
            Task::InventorySet(t) => t.execute(ctx).await,
            Task::InventoryDeleteOrUpdate(t) => t.execute(ctx).await,
            Task::Apply(t) => t.execute(ctx).await,
            Task::Remove(t) => t.execute(ctx).await,
            Task::Wait(t) => t.execute(ctx).await,
        }
    }
}

/// Run `f` for every item with at most `ctx.parallelism` in flight.
///
/// Stops handing out new items once the run is cancelled; items already in
/// flight are awaited.
pub(crate) async fn for_each_bounded<T, F, Fut>(
    ctx: &Arc<TaskContext>,
    items: Vec<T>,
    f: F,
) -> Result<()>
where
    T: Send + 'static,
    F: Fn(Arc<TaskContext>, T) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(ctx.parallelism));
    let mut in_flight = JoinSet::new();

    for item in items {
        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => {
                permit.map_err(|e| KapplyError::Other(e.into()))?
            }
        };
        let fut = f(Arc::clone(ctx), item);
        in_flight.spawn(async move {
            let _permit = permit;
            fut.await;
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "object task did not complete");
        }
    }

    if ctx.cancel.is_cancelled() {
        return Err(KapplyError::Cancelled);
    }
    Ok(())
}
