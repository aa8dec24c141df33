// src/inventory/mod.rs

//! Ownership record ("inventory") handling.
//!
//! - [`policy`] decides whether an object may be adopted or removed.
//! - [`client`] is the storage seam for the record itself.

pub mod client;
pub mod policy;

use serde::{Deserialize, Serialize};

pub use client::{InventoryClient, InventoryOp, MemoryInventoryClient};
pub use policy::{
    ActuationStrategy, IdMatchStatus, InventoryPolicy, PolicyPreventedActuation, can_apply,
    can_prune, id_match,
};

/// Annotation recording which inventory owns an object.
pub const OWNING_INVENTORY_KEY: &str = "config.k8s.io/owning-inventory";

/// Lifecycle annotations that keep an object in the cluster when it leaves
/// the set. Either one abandons the object instead of deleting it.
pub const LIFECYCLE_DELETION_KEY: &str = "client.lifecycle.config.k8s.io/deletion";
pub const LIFECYCLE_DELETION_DETACH: &str = "detach";
pub const ON_REMOVE_KEY: &str = "cli-utils.sigs.k8s.io/on-remove";
pub const ON_REMOVE_KEEP: &str = "keep";

/// Handle for one ownership record: where it lives and the id it stamps on
/// the objects it owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryInfo {
    pub name: String,
    pub namespace: String,
    pub id: String,
}

impl InventoryInfo {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

/// Whether the object asks to be left behind when removed from the set.
pub fn is_abandoned(obj: &crate::object::Unstructured) -> bool {
    obj.annotation(LIFECYCLE_DELETION_KEY) == Some(LIFECYCLE_DELETION_DETACH)
        || obj.annotation(ON_REMOVE_KEY) == Some(ON_REMOVE_KEEP)
}
