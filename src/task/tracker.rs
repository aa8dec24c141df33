// src/task/tracker.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

use crate::event::{ActuationStatus, WaitStatus};
use crate::object::{ObjMetadata, ObjMetadataSet};

#[derive(Debug, Clone, Copy)]
struct Applied {
    status: ActuationStatus,
    /// Generation reported by the cluster after the apply.
    generation: Option<i64>,
}

/// Per-object outcomes accumulated over a run.
///
/// Later tasks read it: the dependency filter, wait tasks (to skip objects
/// that never got actuated) and the final inventory update.
#[derive(Debug, Default)]
pub struct ObjectTracker {
    applied: HashMap<ObjMetadata, Applied>,
    /// Prune and delete outcomes.
    removed: HashMap<ObjMetadata, ActuationStatus>,
    reconciled: HashMap<ObjMetadata, WaitStatus>,
    abandoned: ObjMetadataSet,
}

impl ObjectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_apply(&mut self, id: ObjMetadata, status: ActuationStatus, generation: Option<i64>) {
        self.applied.insert(id, Applied { status, generation });
    }

    pub fn apply_status(&self, id: &ObjMetadata) -> Option<ActuationStatus> {
        self.applied.get(id).map(|a| a.status)
    }

    pub fn applied_generation(&self, id: &ObjMetadata) -> Option<i64> {
        self.applied.get(id).and_then(|a| a.generation)
    }

    pub fn record_removal(&mut self, id: ObjMetadata, status: ActuationStatus) {
        self.removed.insert(id, status);
    }

    pub fn removal_status(&self, id: &ObjMetadata) -> Option<ActuationStatus> {
        self.removed.get(id).copied()
    }

    pub fn record_reconcile(&mut self, id: ObjMetadata, status: WaitStatus) {
        self.reconciled.insert(id, status);
    }

    pub fn reconcile_status(&self, id: &ObjMetadata) -> Option<WaitStatus> {
        self.reconciled.get(id).copied()
    }

    pub fn mark_abandoned(&mut self, id: ObjMetadata) {
        self.abandoned.insert(id);
    }

    pub fn is_abandoned(&self, id: &ObjMetadata) -> bool {
        self.abandoned.contains(id)
    }

    /// Whether objects depending on `id` must not be applied: its apply did
    /// not succeed, or it failed to reconcile.
    pub fn blocks_dependents(&self, id: &ObjMetadata) -> bool {
        matches!(
            self.apply_status(id),
            Some(ActuationStatus::Failed | ActuationStatus::Skipped)
        ) || matches!(
            self.reconcile_status(id),
            Some(WaitStatus::Failed | WaitStatus::Timeout)
        )
    }

    /// Whether `id` is still in the cluster so objects it depends on must
    /// not be removed.
    pub fn blocks_removal_of_dependencies(&self, id: &ObjMetadata) -> bool {
        matches!(
            self.removal_status(id),
            Some(ActuationStatus::Failed | ActuationStatus::Skipped)
        ) || matches!(
            self.reconcile_status(id),
            Some(WaitStatus::Failed | WaitStatus::Timeout)
        )
    }

    pub fn successful_applies(&self, order: &ObjMetadataSet) -> ObjMetadataSet {
        order
            .iter()
            .filter(|id| self.apply_status(id) == Some(ActuationStatus::Successful))
            .cloned()
            .collect()
    }

    /// Members of `candidates` that are still in the cluster after the run:
    /// removal failed, was skipped, or never ran. Abandoned objects are left
    /// out.
    pub fn not_removed(&self, candidates: &ObjMetadataSet) -> ObjMetadataSet {
        candidates
            .iter()
            .filter(|id| !self.is_abandoned(id))
            .filter(|id| self.removal_status(id) != Some(ActuationStatus::Successful))
            .cloned()
            .collect()
    }

    /// Members of `candidates` whose apply failed, was skipped, or never ran.
    pub fn not_applied(&self, candidates: &ObjMetadataSet) -> ObjMetadataSet {
        candidates
            .iter()
            .filter(|id| self.apply_status(id) != Some(ActuationStatus::Successful))
            .cloned()
            .collect()
    }
}

/// Run-wide tallies, updated from concurrently running tasks.
#[derive(Debug, Default)]
pub struct RunCounters {
    applied: AtomicUsize,
    apply_failed: AtomicUsize,
    apply_skipped: AtomicUsize,
    pruned: AtomicUsize,
    prune_failed: AtomicUsize,
    prune_skipped: AtomicUsize,
    deleted: AtomicUsize,
    delete_failed: AtomicUsize,
    delete_skipped: AtomicUsize,
    reconciled: AtomicUsize,
    reconcile_failed: AtomicUsize,
    reconcile_timeout: AtomicUsize,
    reconcile_skipped: AtomicUsize,
    abandoned: AtomicUsize,
}

/// What a counter increment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tally {
    Apply(ActuationStatus),
    Prune(ActuationStatus),
    Delete(ActuationStatus),
    Reconcile(WaitStatus),
    /// Left in the cluster on request; not a failure.
    Abandoned,
}

impl RunCounters {
    pub fn record(&self, tally: Tally) {
        let counter = match tally {
            Tally::Apply(ActuationStatus::Successful) => &self.applied,
            Tally::Apply(ActuationStatus::Failed) => &self.apply_failed,
            Tally::Apply(ActuationStatus::Skipped) => &self.apply_skipped,
            Tally::Prune(ActuationStatus::Successful) => &self.pruned,
            Tally::Prune(ActuationStatus::Failed) => &self.prune_failed,
            Tally::Prune(ActuationStatus::Skipped) => &self.prune_skipped,
            Tally::Delete(ActuationStatus::Successful) => &self.deleted,
            Tally::Delete(ActuationStatus::Failed) => &self.delete_failed,
            Tally::Delete(ActuationStatus::Skipped) => &self.delete_skipped,
            Tally::Reconcile(WaitStatus::Successful) => &self.reconciled,
            Tally::Reconcile(WaitStatus::Failed) => &self.reconcile_failed,
            Tally::Reconcile(WaitStatus::Timeout) => &self.reconcile_timeout,
            Tally::Reconcile(WaitStatus::Skipped) => &self.reconcile_skipped,
            Tally::Reconcile(WaitStatus::Pending) => return,
            Tally::Abandoned => &self.abandoned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        RunSummary {
            applied: load(&self.applied),
            apply_failed: load(&self.apply_failed),
            apply_skipped: load(&self.apply_skipped),
            pruned: load(&self.pruned),
            prune_failed: load(&self.prune_failed),
            prune_skipped: load(&self.prune_skipped),
            deleted: load(&self.deleted),
            delete_failed: load(&self.delete_failed),
            delete_skipped: load(&self.delete_skipped),
            reconciled: load(&self.reconciled),
            reconcile_failed: load(&self.reconcile_failed),
            reconcile_timeout: load(&self.reconcile_timeout),
            reconcile_skipped: load(&self.reconcile_skipped),
            abandoned: load(&self.abandoned),
        }
    }
}

/// Final tallies of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub applied: usize,
    pub apply_failed: usize,
    pub apply_skipped: usize,
    pub pruned: usize,
    pub prune_failed: usize,
    pub prune_skipped: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    pub delete_skipped: usize,
    pub reconciled: usize,
    pub reconcile_failed: usize,
    pub reconcile_timeout: usize,
    pub reconcile_skipped: usize,
    pub abandoned: usize,
}

impl RunSummary {
    /// Resource-level failures, skips included.
    pub fn failures(&self) -> usize {
        self.apply_failed
            + self.apply_skipped
            + self.prune_failed
            + self.prune_skipped
            + self.delete_failed
            + self.delete_skipped
            + self.reconcile_failed
            + self.reconcile_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ObjMetadata {
        ObjMetadata::new("", "ConfigMap", "default", name)
    }

    #[test]
    fn failed_or_timed_out_objects_block_dependents() {
        let mut tracker = ObjectTracker::new();
        tracker.record_apply(id("a"), ActuationStatus::Successful, Some(1));
        tracker.record_apply(id("b"), ActuationStatus::Skipped, None);
        tracker.record_apply(id("c"), ActuationStatus::Successful, Some(1));
        tracker.record_reconcile(id("c"), WaitStatus::Timeout);

        assert!(!tracker.blocks_dependents(&id("a")));
        assert!(tracker.blocks_dependents(&id("b")));
        assert!(tracker.blocks_dependents(&id("c")));
    }

    #[test]
    fn not_removed_excludes_abandoned() {
        let mut tracker = ObjectTracker::new();
        tracker.record_removal(id("a"), ActuationStatus::Successful);
        tracker.record_removal(id("b"), ActuationStatus::Failed);
        tracker.record_removal(id("c"), ActuationStatus::Skipped);
        tracker.mark_abandoned(id("c"));

        let candidates: ObjMetadataSet = vec![id("a"), id("b"), id("c"), id("d")].into();
        assert_eq!(tracker.not_removed(&candidates), vec![id("b"), id("d")].into());
    }

    #[test]
    fn counters_feed_the_summary() {
        let counters = RunCounters::default();
        counters.record(Tally::Apply(ActuationStatus::Successful));
        counters.record(Tally::Apply(ActuationStatus::Failed));
        counters.record(Tally::Reconcile(WaitStatus::Pending));
        let summary = counters.snapshot();
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.failures(), 1);
    }
}
