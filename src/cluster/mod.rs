// src/cluster/mod.rs

//! Cluster access seam.
//!
//! The engine talks to the cluster only through these traits:
//! - [`ClusterReader`] is all the status poller needs.
//! - [`ClusterClient`] adds the mutations used by apply/prune/delete tasks.
//!
//! [`memory::MemoryCluster`] is an in-process implementation used by the
//! test suite and for previews.

pub mod memory;

use async_trait::async_trait;

use crate::errors::Result;
use crate::object::{GroupKind, ObjMetadata, Unstructured};
use crate::types::DryRunStrategy;

pub use memory::MemoryCluster;

#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Current state of one object, `None` if it does not exist.
    async fn get(&self, id: &ObjMetadata) -> Result<Option<Unstructured>>;

    /// All objects of `group_kind` in `namespace` (empty for cluster scope).
    async fn list(&self, group_kind: &GroupKind, namespace: &str) -> Result<Vec<Unstructured>>;
}

#[async_trait]
pub trait ClusterClient: ClusterReader {
    /// Create or update `obj`, returning the stored state (with its new
    /// `metadata.generation`).
    async fn apply(&self, obj: &Unstructured, dry_run: DryRunStrategy) -> Result<Unstructured>;

    /// Delete the object. Deleting a missing object succeeds.
    async fn delete(&self, id: &ObjMetadata, dry_run: DryRunStrategy) -> Result<()>;
}
