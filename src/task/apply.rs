// src/task/apply.rs

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{KapplyError, Result};
use crate::event::{ActuationStatus, Event, EventError};
use crate::inventory::{OWNING_INVENTORY_KEY, can_apply};
use crate::object::{ObjMetadata, Unstructured};
use crate::task::tracker::Tally;
use crate::task::{TaskContext, for_each_bounded};
use crate::types::DryRunStrategy;

/// Apply one dependency layer.
#[derive(Debug, Clone)]
pub struct ApplyTask {
    pub name: String,
    pub objects: Vec<(ObjMetadata, Unstructured)>,
}

struct Applied {
    status: ActuationStatus,
    generation: Option<i64>,
    error: Option<KapplyError>,
}

impl ApplyTask {
    pub fn identifiers(&self) -> Vec<ObjMetadata> {
        self.objects.iter().map(|(id, _)| id.clone()).collect()
    }

    pub async fn execute(&self, ctx: &Arc<TaskContext>) -> Result<()> {
        let group: Arc<str> = Arc::from(self.name.as_str());
        for_each_bounded(ctx, self.objects.clone(), move |ctx, (id, obj)| {
            let group = Arc::clone(&group);
            async move { apply_one(ctx, group, id, obj).await }
        })
        .await
    }
}

async fn apply_one(ctx: Arc<TaskContext>, group: Arc<str>, id: ObjMetadata, obj: Unstructured) {
    let applied = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            debug!(task = %group, id = %id, "apply interrupted by cancellation");
            return;
        }
        applied = try_apply(&ctx, &id, obj) => applied,
    };

    match (&applied.status, &applied.error) {
        (ActuationStatus::Successful, _) => {
            info!(task = %group, id = %id, generation = ?applied.generation, "applied");
        }
        (status, Some(err)) => warn!(task = %group, id = %id, ?status, error = %err, "apply not completed"),
        (status, None) => debug!(task = %group, id = %id, ?status, "apply not completed"),
    }

    ctx.tracker()
        .record_apply(id.clone(), applied.status, applied.generation);
    ctx.tally(Tally::Apply(applied.status));
    ctx.events
        .send(Event::Apply {
            group: group.to_string(),
            id,
            status: applied.status,
            error: applied.error.map(EventError::from),
        })
        .await;
}

async fn try_apply(ctx: &TaskContext, id: &ObjMetadata, obj: Unstructured) -> Applied {
    let skipped = |err: KapplyError| Applied {
        status: ActuationStatus::Skipped,
        generation: None,
        error: Some(err),
    };
    let failed = |err: KapplyError| Applied {
        status: ActuationStatus::Failed,
        generation: None,
        error: Some(err),
    };

    let blocked_by = {
        let tracker = ctx.tracker();
        ctx.graph
            .dependencies_of(id)
            .iter()
            .find(|dep| tracker.blocks_dependents(dep))
            .cloned()
    };
    if let Some(dependency) = blocked_by {
        return skipped(KapplyError::DependencyFailed {
            id: id.clone(),
            dependency,
        });
    }

    let live = match ctx.cluster.get(id).await {
        Ok(live) => live,
        Err(err) => return failed(err),
    };

    if let Err(prevented) = can_apply(&ctx.inventory, live.as_ref(), ctx.policy) {
        return skipped(prevented.into());
    }

    let mut desired = obj;
    desired.set_annotation(OWNING_INVENTORY_KEY, &ctx.inventory.id);

    if ctx.dry_run == DryRunStrategy::Client {
        let generation = live.and_then(|l| l.generation().ok().flatten());
        return Applied {
            status: ActuationStatus::Successful,
            generation,
            error: None,
        };
    }

    match ctx.cluster.apply(&desired, ctx.dry_run).await {
        Ok(stored) => Applied {
            status: ActuationStatus::Successful,
            generation: stored.generation().ok().flatten(),
            error: None,
        },
        Err(err) => failed(err),
    }
}
