// src/task/remove.rs

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{KapplyError, Result};
use crate::event::{ActionKind, ActuationStatus, Event, EventError};
use crate::inventory::{OWNING_INVENTORY_KEY, can_prune, is_abandoned};
use crate::object::ObjMetadata;
use crate::task::tracker::Tally;
use crate::task::{TaskContext, for_each_bounded};
use crate::types::DryRunStrategy;

/// Why an object is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalKind {
    /// Dropped from the desired set during apply.
    Prune,
    /// Part of a destroy run.
    Delete,
}

/// Prune or delete one dependency layer.
#[derive(Debug, Clone)]
pub struct RemoveTask {
    pub name: String,
    pub kind: RemovalKind,
    pub ids: Vec<ObjMetadata>,
}

struct Removed {
    status: ActuationStatus,
    error: Option<KapplyError>,
}

impl Removed {
    fn done() -> Self {
        Self {
            status: ActuationStatus::Successful,
            error: None,
        }
    }

    fn skipped(error: Option<KapplyError>) -> Self {
        Self {
            status: ActuationStatus::Skipped,
            error,
        }
    }

    fn failed(error: KapplyError) -> Self {
        Self {
            status: ActuationStatus::Failed,
            error: Some(error),
        }
    }
}

impl RemoveTask {
    pub fn action(&self) -> ActionKind {
        match self.kind {
            RemovalKind::Prune => ActionKind::Prune,
            RemovalKind::Delete => ActionKind::Delete,
        }
    }

    pub async fn execute(&self, ctx: &Arc<TaskContext>) -> Result<()> {
        let group: Arc<str> = Arc::from(self.name.as_str());
        let kind = self.kind;
        for_each_bounded(ctx, self.ids.clone(), move |ctx, id| {
            let group = Arc::clone(&group);
            async move { remove_one(ctx, group, kind, id).await }
        })
        .await
    }
}

async fn remove_one(ctx: Arc<TaskContext>, group: Arc<str>, kind: RemovalKind, id: ObjMetadata) {
    let removed = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            debug!(task = %group, id = %id, "removal interrupted by cancellation");
            return;
        }
        removed = try_remove(&ctx, &id) => removed,
    };

    match (&removed.status, &removed.error) {
        (ActuationStatus::Successful, _) => info!(task = %group, id = %id, "removed"),
        (status, Some(err)) => warn!(task = %group, id = %id, ?status, error = %err, "removal not completed"),
        (status, None) => info!(task = %group, id = %id, ?status, "left in place"),
    }

    ctx.tracker().record_removal(id.clone(), removed.status);
    let abandoned = removed.status == ActuationStatus::Skipped && removed.error.is_none();
    let tally = match kind {
        _ if abandoned => Tally::Abandoned,
        RemovalKind::Prune => Tally::Prune(removed.status),
        RemovalKind::Delete => Tally::Delete(removed.status),
    };
    ctx.tally(tally);

    let error = removed.error.map(EventError::from);
    let event = match kind {
        RemovalKind::Prune => Event::Prune {
            group: group.to_string(),
            id,
            status: removed.status,
            error,
        },
        RemovalKind::Delete => Event::Delete {
            group: group.to_string(),
            id,
            status: removed.status,
            error,
        },
    };
    ctx.events.send(event).await;
}

async fn try_remove(ctx: &TaskContext, id: &ObjMetadata) -> Removed {
    let still_needed_by = {
        let tracker = ctx.tracker();
        ctx.graph
            .dependents_of(id)
            .iter()
            .find(|dependent| tracker.blocks_removal_of_dependencies(dependent))
            .cloned()
    };
    if let Some(dependent) = still_needed_by {
        return Removed::skipped(Some(KapplyError::DependentRemains {
            id: id.clone(),
            dependent,
        }));
    }

    let live = match ctx.cluster.get(id).await {
        Ok(Some(live)) => live,
        Ok(None) => {
            debug!(id = %id, "already gone");
            return Removed::done();
        }
        Err(err) => return Removed::failed(err),
    };

    if is_abandoned(&live) {
        // Detach: the object stays but no longer claims this inventory.
        if ctx.dry_run != DryRunStrategy::Client {
            let mut detached = live;
            detached.remove_field(&["metadata", "annotations", OWNING_INVENTORY_KEY]);
            if let Err(err) = ctx.cluster.apply(&detached, ctx.dry_run).await {
                return Removed::failed(err);
            }
        }
        ctx.tracker().mark_abandoned(id.clone());
        return Removed::skipped(None);
    }

    if let Err(prevented) = can_prune(&ctx.inventory, &live, ctx.policy) {
        return Removed::skipped(Some(prevented.into()));
    }

    if ctx.dry_run == DryRunStrategy::Client {
        return Removed::done();
    }

    match ctx.cluster.delete(id, ctx.dry_run).await {
        Ok(()) => Removed::done(),
        Err(err) => Removed::failed(err),
    }
}
