// src/cluster/memory.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{ClusterClient, ClusterReader};
use crate::errors::{KapplyError, Result};
use crate::object::{GroupKind, ObjMetadata, Unstructured};
use crate::types::DryRunStrategy;

/// How many upcoming reads of an object should fail.
#[derive(Debug, Clone, Copy)]
enum ReadFailures {
    Times(u32),
    Always,
}

/// In-memory cluster.
///
/// Mimics the bits of API server behaviour the engine relies on:
/// - `metadata.generation` starts at 1 and bumps when the desired state changes,
/// - `metadata.resourceVersion` changes on every write,
/// - with auto-reconcile on (the default), an applied object immediately
///   reports `status.observedGeneration == metadata.generation`.
///
/// Failures can be injected per object for apply, delete and reads.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    objects: Arc<Mutex<BTreeMap<ObjMetadata, Unstructured>>>,
    resource_version: Arc<AtomicU64>,
    auto_reconcile: Arc<AtomicBool>,
    failing_applies: Arc<Mutex<HashSet<ObjMetadata>>>,
    failing_deletes: Arc<Mutex<HashSet<ObjMetadata>>>,
    failing_reads: Arc<Mutex<HashMap<ObjMetadata, ReadFailures>>>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            resource_version: Arc::new(AtomicU64::new(0)),
            auto_reconcile: Arc::new(AtomicBool::new(true)),
            failing_applies: Arc::new(Mutex::new(HashSet::new())),
            failing_deletes: Arc::new(Mutex::new(HashSet::new())),
            failing_reads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stop reporting applied objects as reconciled; tests then drive status
    /// through [`MemoryCluster::set_status`].
    pub fn without_auto_reconcile(self) -> Self {
        self.auto_reconcile.store(false, Ordering::SeqCst);
        self
    }

    /// Store an object as-is (e.g. pre-existing state), assigning a new
    /// resourceVersion.
    pub fn insert(&self, obj: Unstructured) -> Result<()> {
        let id = obj.id()?;
        let mut obj = obj;
        self.stamp_resource_version(&mut obj);
        self.lock_objects().insert(id, obj);
        Ok(())
    }

    pub fn object(&self, id: &ObjMetadata) -> Option<Unstructured> {
        self.lock_objects().get(id).cloned()
    }

    pub fn contains(&self, id: &ObjMetadata) -> bool {
        self.lock_objects().contains_key(id)
    }

    pub fn ids(&self) -> Vec<ObjMetadata> {
        self.lock_objects().keys().cloned().collect()
    }

    /// Replace the `status` of a stored object.
    pub fn set_status(&self, id: &ObjMetadata, status: Value) -> Result<()> {
        let mut objects = self.lock_objects();
        let obj = objects
            .get_mut(id)
            .ok_or_else(|| KapplyError::Cluster(format!("{id} not found")))?;
        obj.set_field(&["status"], status);
        let rv = self.resource_version.fetch_add(1, Ordering::SeqCst) + 1;
        obj.set_field(&["metadata", "resourceVersion"], json!(rv.to_string()));
        Ok(())
    }

    /// Mark an object as being deleted without removing it.
    pub fn mark_terminating(&self, id: &ObjMetadata) -> Result<()> {
        let mut objects = self.lock_objects();
        let obj = objects
            .get_mut(id)
            .ok_or_else(|| KapplyError::Cluster(format!("{id} not found")))?;
        obj.set_field(
            &["metadata", "deletionTimestamp"],
            json!("2024-01-01T00:00:00Z"),
        );
        Ok(())
    }

    pub fn remove(&self, id: &ObjMetadata) -> Option<Unstructured> {
        self.lock_objects().remove(id)
    }

    pub fn fail_apply(&self, id: ObjMetadata) {
        self.failing_applies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    pub fn fail_delete(&self, id: ObjMetadata) {
        self.failing_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    /// Fail the next `times` reads of `id`.
    pub fn fail_reads(&self, id: ObjMetadata, times: u32) {
        self.failing_reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, ReadFailures::Times(times));
    }

    pub fn fail_reads_always(&self, id: ObjMetadata) {
        self.failing_reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, ReadFailures::Always);
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObjMetadata, Unstructured>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stamp_resource_version(&self, obj: &mut Unstructured) {
        let rv = self.resource_version.fetch_add(1, Ordering::SeqCst) + 1;
        obj.set_field(&["metadata", "resourceVersion"], json!(rv.to_string()));
    }

    fn take_read_failure(&self, id: &ObjMetadata) -> Result<()> {
        let mut failing = self
            .failing_reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match failing.get_mut(id) {
            Some(ReadFailures::Always) => {}
            Some(ReadFailures::Times(n)) if *n > 0 => {
                *n -= 1;
            }
            _ => return Ok(()),
        }
        Err(KapplyError::Fetch {
            id: id.clone(),
            message: "injected read failure".to_string(),
        })
    }
}

/// Desired state without server-managed fields, for change detection.
fn desired_state(obj: &Unstructured) -> Value {
    let mut copy = obj.clone();
    copy.remove_field(&["status"]);
    copy.remove_field(&["metadata", "generation"]);
    copy.remove_field(&["metadata", "resourceVersion"]);
    copy.into_value()
}

#[async_trait]
impl ClusterReader for MemoryCluster {
    async fn get(&self, id: &ObjMetadata) -> Result<Option<Unstructured>> {
        self.take_read_failure(id)?;
        Ok(self.object(id))
    }

    async fn list(&self, group_kind: &GroupKind, namespace: &str) -> Result<Vec<Unstructured>> {
        let ids: Vec<ObjMetadata> = self
            .lock_objects()
            .keys()
            .filter(|id| id.group == group_kind.group && id.kind == group_kind.kind)
            .filter(|id| id.namespace == namespace)
            .cloned()
            .collect();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            // Injected failures apply to the whole list call, like a failed request.
            self.take_read_failure(&id)?;
            if let Some(obj) = self.object(&id) {
                out.push(obj);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn apply(&self, obj: &Unstructured, dry_run: DryRunStrategy) -> Result<Unstructured> {
        let id = obj.id()?;
        let failing = self
            .failing_applies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id);
        if failing {
            return Err(KapplyError::Apply {
                id,
                message: "injected apply failure".to_string(),
            });
        }

        let existing = self.object(&id);
        let generation = match &existing {
            Some(current) => {
                let current_gen = current.generation()?.unwrap_or(1);
                if desired_state(current) == desired_state(obj) {
                    current_gen
                } else {
                    current_gen + 1
                }
            }
            None => 1,
        };

        let mut stored = obj.clone();
        stored.remove_field(&["status"]);
        if let Some(status) = existing.as_ref().and_then(|c| c.field(&["status"])) {
            stored.set_field(&["status"], status.clone());
        }
        stored.set_field(&["metadata", "generation"], json!(generation));
        if self.auto_reconcile.load(Ordering::SeqCst) {
            stored.set_field(&["status", "observedGeneration"], json!(generation));
        }
        self.stamp_resource_version(&mut stored);

        if dry_run.is_dry_run() {
            debug!(id = %id, "dry-run apply; not storing");
            return Ok(stored);
        }

        debug!(id = %id, generation, "stored object");
        self.lock_objects().insert(id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &ObjMetadata, dry_run: DryRunStrategy) -> Result<()> {
        let failing = self
            .failing_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id);
        if failing {
            return Err(KapplyError::Delete {
                id: id.clone(),
                message: "injected delete failure".to_string(),
            });
        }

        if !dry_run.is_dry_run() {
            self.lock_objects().remove(id);
            debug!(id = %id, "deleted object");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map(data: &str) -> Unstructured {
        Unstructured::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cfg", "namespace": "default" },
            "data": { "key": data }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn generation_bumps_only_on_change() {
        let cluster = MemoryCluster::new();
        let first = cluster.apply(&config_map("a"), DryRunStrategy::None).await.unwrap();
        assert_eq!(first.generation().unwrap(), Some(1));

        let same = cluster.apply(&config_map("a"), DryRunStrategy::None).await.unwrap();
        assert_eq!(same.generation().unwrap(), Some(1));

        let changed = cluster.apply(&config_map("b"), DryRunStrategy::None).await.unwrap();
        assert_eq!(changed.generation().unwrap(), Some(2));
        assert_eq!(
            changed.nested_i64(&["status", "observedGeneration"]).unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn dry_run_does_not_store() {
        let cluster = MemoryCluster::new();
        let obj = config_map("a");
        cluster.apply(&obj, DryRunStrategy::Server).await.unwrap();
        assert!(!cluster.contains(&obj.id().unwrap()));
    }

    #[tokio::test]
    async fn read_failures_are_consumed() {
        let cluster = MemoryCluster::new();
        let obj = config_map("a");
        let id = obj.id().unwrap();
        cluster.insert(obj).unwrap();
        cluster.fail_reads(id.clone(), 1);

        assert!(cluster.get(&id).await.is_err());
        assert!(cluster.get(&id).await.unwrap().is_some());
    }
}
