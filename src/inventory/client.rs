// src/inventory/client.rs

//! Storage seam for the ownership record.
//!
//! The engine only needs load/replace/delete of one record. The real client
//! (a ConfigMap or a dedicated resource) lives with the caller; the
//! [`MemoryInventoryClient`] here backs tests and previews.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{KapplyError, Result};
use crate::inventory::InventoryInfo;
use crate::object::ObjMetadataSet;

#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Current membership of the record, or `None` if it does not exist.
    async fn load(&self, inv: &InventoryInfo) -> Result<Option<ObjMetadataSet>>;

    /// Create or overwrite the record with exactly `objects`.
    async fn replace(&self, inv: &InventoryInfo, objects: &ObjMetadataSet) -> Result<()>;

    /// Delete the record. Deleting a missing record is not an error.
    async fn delete(&self, inv: &InventoryInfo) -> Result<()>;
}

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryOp {
    Load,
    Replace,
    Delete,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    id: String,
    objects: ObjMetadataSet,
}

/// In-memory inventory storage keyed by (namespace, name).
#[derive(Debug, Clone, Default)]
pub struct MemoryInventoryClient {
    records: Arc<Mutex<HashMap<(String, String), StoredRecord>>>,
    failing: Arc<Mutex<HashSet<InventoryOp>>>,
}

impl MemoryInventoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, e.g. to simulate a previous run.
    pub fn insert(&self, inv: &InventoryInfo, objects: ObjMetadataSet) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(
            key(inv),
            StoredRecord {
                id: inv.id.clone(),
                objects,
            },
        );
    }

    /// Stored membership, bypassing failure injection.
    pub fn snapshot(&self, inv: &InventoryInfo) -> Option<ObjMetadataSet> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(&key(inv)).map(|r| r.objects.clone())
    }

    /// Make every subsequent call of `op` fail.
    pub fn fail_on(&self, op: InventoryOp) {
        let mut failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        failing.insert(op);
    }

    fn check(&self, inv: &InventoryInfo, op: InventoryOp) -> Result<()> {
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(&op) {
            return Err(KapplyError::Inventory {
                name: inv.name.clone(),
                message: format!("injected {op:?} failure"),
            });
        }
        Ok(())
    }
}

fn key(inv: &InventoryInfo) -> (String, String) {
    (inv.namespace.clone(), inv.name.clone())
}

#[async_trait]
impl InventoryClient for MemoryInventoryClient {
    async fn load(&self, inv: &InventoryInfo) -> Result<Option<ObjMetadataSet>> {
        self.check(inv, InventoryOp::Load)?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.get(&key(inv)) {
            Some(record) if record.id != inv.id => Err(KapplyError::Inventory {
                name: inv.name.clone(),
                message: format!(
                    "record is owned by inventory id '{}', not '{}'",
                    record.id, inv.id
                ),
            }),
            Some(record) => Ok(Some(record.objects.clone())),
            None => Ok(None),
        }
    }

    async fn replace(&self, inv: &InventoryInfo, objects: &ObjMetadataSet) -> Result<()> {
        self.check(inv, InventoryOp::Replace)?;
        debug!(inventory = %inv.name, count = objects.len(), "replacing inventory record");
        self.insert(inv, objects.clone());
        Ok(())
    }

    async fn delete(&self, inv: &InventoryInfo) -> Result<()> {
        self.check(inv, InventoryOp::Delete)?;
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(&key(inv));
        debug!(inventory = %inv.name, "deleted inventory record");
        Ok(())
    }
}
