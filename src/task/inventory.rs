// src/task/inventory.rs

//! Tasks that write the ownership record.
//!
//! Every failure here is reported as [`KapplyError::Inventory`] so the
//! runner treats it as fatal.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{KapplyError, Result};
use crate::object::ObjMetadataSet;
use crate::task::TaskContext;

pub const INVENTORY_ADD: &str = "inventory-add-0";
pub const INVENTORY_SET: &str = "inventory-set-0";
pub const INVENTORY_DELETE_OR_UPDATE: &str = "inventory-delete-or-update-0";

/// Record every object the run is about to touch before touching any.
#[derive(Debug, Clone)]
pub struct InventoryAddTask {
    pub previous: ObjMetadataSet,
    pub desired: ObjMetadataSet,
}

impl InventoryAddTask {
    pub async fn execute(&self, ctx: &Arc<TaskContext>) -> Result<()> {
        let record = self.previous.union(&self.desired);
        write_record(ctx, INVENTORY_ADD, &record).await
    }
}

/// Shrink the record to what the run actually left in the cluster.
#[derive(Debug, Clone)]
pub struct InventorySetTask {
    pub previous: ObjMetadataSet,
    pub desired: ObjMetadataSet,
    /// Previous members no longer desired, whether or not pruning ran.
    pub prune_candidates: ObjMetadataSet,
}

impl InventorySetTask {
    /// Successful applies, plus previously owned objects whose apply did not
    /// go through, plus prune candidates still in the cluster. Abandoned
    /// objects are dropped.
    pub fn record(&self, ctx: &TaskContext) -> ObjMetadataSet {
        let tracker = ctx.tracker();
        let applied = tracker.successful_applies(&self.desired);
        let kept = tracker.not_applied(&self.desired).intersection(&self.previous);
        let stale = tracker.not_removed(&self.prune_candidates);
        applied.union(&kept).union(&stale)
    }

    pub async fn execute(&self, ctx: &Arc<TaskContext>) -> Result<()> {
        let record = self.record(ctx);
        write_record(ctx, INVENTORY_SET, &record).await
    }
}

/// Delete the record after a destroy, or keep whatever could not be
/// deleted.
#[derive(Debug, Clone)]
pub struct InventoryDeleteOrUpdateTask {
    pub members: ObjMetadataSet,
}

impl InventoryDeleteOrUpdateTask {
    pub async fn execute(&self, ctx: &Arc<TaskContext>) -> Result<()> {
        let remaining = ctx.tracker().not_removed(&self.members);
        if !remaining.is_empty() {
            return write_record(ctx, INVENTORY_DELETE_OR_UPDATE, &remaining).await;
        }

        if ctx.dry_run.is_dry_run() {
            debug!(task = INVENTORY_DELETE_OR_UPDATE, "dry run; inventory record left in place");
            return Ok(());
        }
        ctx.inventory_client
            .delete(&ctx.inventory)
            .await
            .map_err(|err| as_inventory_error(ctx, err))?;
        info!(task = INVENTORY_DELETE_OR_UPDATE, inventory = %ctx.inventory.name, "inventory record deleted");
        Ok(())
    }
}

async fn write_record(ctx: &TaskContext, task: &str, record: &ObjMetadataSet) -> Result<()> {
    if ctx.dry_run.is_dry_run() {
        debug!(task, count = record.len(), "dry run; inventory record not written");
        return Ok(());
    }
    ctx.inventory_client
        .replace(&ctx.inventory, record)
        .await
        .map_err(|err| as_inventory_error(ctx, err))?;
    info!(task, inventory = %ctx.inventory.name, count = record.len(), "inventory record written");
    Ok(())
}

fn as_inventory_error(ctx: &TaskContext, err: KapplyError) -> KapplyError {
    match err {
        err @ KapplyError::Inventory { .. } => err,
        other => KapplyError::Inventory {
            name: ctx.inventory.name.clone(),
            message: other.to_string(),
        },
    }
}
