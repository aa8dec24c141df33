// src/apply/mod.rs

//! Entry points: [`Applier`] and [`Destroyer`].
//!
//! Both validate their input, build a task plan and hand it to the
//! [`TaskRunner`](crate::engine::TaskRunner) on a background task. The caller
//! gets the event stream back immediately.

pub mod applier;
pub mod destroyer;
pub mod options;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::cluster::ClusterClient;
use crate::dag::DependencyGraph;
use crate::errors::{KapplyError, Result};
use crate::inventory::{InventoryClient, InventoryInfo};
use crate::object::{ObjMetadataSet, Unstructured};

pub use applier::Applier;
pub use destroyer::Destroyer;
pub use options::{ApplierOptions, DestroyerOptions};

static RUN_IDS: AtomicU64 = AtomicU64::new(1);

/// Process-unique id used to tie a run's log lines together.
pub(crate) fn next_run_id() -> u64 {
    RUN_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Current membership of the record; a missing record is empty.
pub(crate) async fn load_inventory(
    client: &dyn InventoryClient,
    inv: &InventoryInfo,
) -> Result<ObjMetadataSet> {
    match client.load(inv).await {
        Ok(members) => Ok(members.unwrap_or_default()),
        Err(err @ KapplyError::Inventory { .. }) => Err(err),
        Err(other) => Err(KapplyError::Inventory {
            name: inv.name.clone(),
            message: other.to_string(),
        }),
    }
}

/// Live copies of `ids` that can be read right now. Missing or unreadable
/// objects are left out.
pub(crate) async fn fetch_live(cluster: &dyn ClusterClient, ids: &ObjMetadataSet) -> Vec<Unstructured> {
    let mut live = Vec::with_capacity(ids.len());
    for id in ids {
        match cluster.get(id).await {
            Ok(Some(obj)) => live.push(obj),
            Ok(None) => debug!(id = %id, "object already gone"),
            Err(err) => warn!(id = %id, error = %err, "could not read object; ordering it without dependencies"),
        }
    }
    live
}

/// Graph over `ids` using whatever edges the live objects declare.
///
/// Objects from the cluster were not validated by us, so a malformed
/// annotation only costs the ordering information, not the run.
pub(crate) fn removal_graph(live: &[Unstructured], ids: &ObjMetadataSet) -> DependencyGraph {
    let mut graph = DependencyGraph::from_objects(live).unwrap_or_else(|err| {
        warn!(error = %err, "ignoring dependencies of live objects");
        DependencyGraph::default()
    });
    graph.extend_ids(ids.iter().cloned());
    graph
}

/// Cluster handle shared by entry points.
pub type SharedCluster = Arc<dyn ClusterClient>;
