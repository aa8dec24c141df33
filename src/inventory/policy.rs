// src/inventory/policy.rs

//! Ownership policy predicates.
//!
//! These are pure functions over the inventory id and the live object's
//! owning-inventory annotation. They never touch the cluster.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inventory::{InventoryInfo, OWNING_INVENTORY_KEY};
use crate::object::Unstructured;

/// Whether a run may mutate objects owned by another (or no) inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InventoryPolicy {
    /// Only objects already owned by this inventory (or new objects).
    #[default]
    MustMatch,
    /// Also adopt objects with no owning inventory.
    AdoptIfNoInventory,
    /// Adopt everything, including objects owned by another inventory.
    AdoptAll,
}

impl fmt::Display for InventoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InventoryPolicy::MustMatch => "MustMatch",
            InventoryPolicy::AdoptIfNoInventory => "AdoptIfNoInventory",
            InventoryPolicy::AdoptAll => "AdoptAll",
        };
        f.write_str(s)
    }
}

impl FromStr for InventoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "must-match" => Ok(InventoryPolicy::MustMatch),
            "adopt-if-no-inventory" => Ok(InventoryPolicy::AdoptIfNoInventory),
            "adopt-all" => Ok(InventoryPolicy::AdoptAll),
            other => Err(format!(
                "invalid inventory_policy: {other} (expected \"must-match\", \"adopt-if-no-inventory\" or \"adopt-all\")"
            )),
        }
    }
}

/// How an object's owning-inventory annotation relates to an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdMatchStatus {
    /// Annotation absent.
    Empty,
    Match,
    /// Annotation present with a different value (an empty value included).
    NoMatch,
}

impl fmt::Display for IdMatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdMatchStatus::Empty => "Empty",
            IdMatchStatus::Match => "Match",
            IdMatchStatus::NoMatch => "NoMatch",
        };
        f.write_str(s)
    }
}

/// Which mutation a policy check guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActuationStrategy {
    Apply,
    Delete,
}

impl fmt::Display for ActuationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuationStrategy::Apply => f.write_str("apply"),
            ActuationStrategy::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("inventory policy prevented actuation (strategy: {strategy}, status: {status}, policy: {policy})")]
pub struct PolicyPreventedActuation {
    pub strategy: ActuationStrategy,
    pub policy: InventoryPolicy,
    pub status: IdMatchStatus,
}

/// Compare the object's owning-inventory annotation with `inv`.
pub fn id_match(inv: &InventoryInfo, obj: &Unstructured) -> IdMatchStatus {
    match obj.annotation(OWNING_INVENTORY_KEY) {
        None => IdMatchStatus::Empty,
        Some(owner) if owner == inv.id => IdMatchStatus::Match,
        Some(_) => IdMatchStatus::NoMatch,
    }
}

/// Whether `live` may be applied under `policy`.
///
/// `live` is the current cluster state; `None` means the object does not
/// exist yet, which is always allowed.
pub fn can_apply(
    inv: &InventoryInfo,
    live: Option<&Unstructured>,
    policy: InventoryPolicy,
) -> Result<(), PolicyPreventedActuation> {
    let Some(live) = live else {
        return Ok(());
    };

    let status = id_match(inv, live);
    let allowed = match status {
        IdMatchStatus::Empty => policy != InventoryPolicy::MustMatch,
        IdMatchStatus::Match => true,
        IdMatchStatus::NoMatch => policy == InventoryPolicy::AdoptAll,
    };

    if allowed {
        Ok(())
    } else {
        Err(PolicyPreventedActuation {
            strategy: ActuationStrategy::Apply,
            policy,
            status,
        })
    }
}

/// Whether `live` may be pruned or deleted under `policy`.
pub fn can_prune(
    inv: &InventoryInfo,
    live: &Unstructured,
    policy: InventoryPolicy,
) -> Result<(), PolicyPreventedActuation> {
    let status = id_match(inv, live);
    let allowed = match status {
        IdMatchStatus::Empty => matches!(
            policy,
            InventoryPolicy::AdoptIfNoInventory | InventoryPolicy::AdoptAll
        ),
        IdMatchStatus::Match => true,
        IdMatchStatus::NoMatch => policy == InventoryPolicy::AdoptAll,
    };

    if allowed {
        Ok(())
    } else {
        Err(PolicyPreventedActuation {
            strategy: ActuationStrategy::Delete,
            policy,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inv() -> InventoryInfo {
        InventoryInfo::new("inventory-name", "inventory-namespace", "foo")
    }

    fn owned_by(owner: Option<&str>) -> Unstructured {
        let mut obj = Unstructured::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "web", "namespace": "default" }
        }))
        .unwrap();
        if let Some(owner) = owner {
            obj.set_annotation(OWNING_INVENTORY_KEY, owner);
        }
        obj
    }

    #[test]
    fn prune_of_unowned_object_requires_adoption() {
        let obj = owned_by(None);
        assert!(can_prune(&inv(), &obj, InventoryPolicy::MustMatch).is_err());
        assert!(can_prune(&inv(), &obj, InventoryPolicy::AdoptIfNoInventory).is_ok());
        assert!(can_prune(&inv(), &obj, InventoryPolicy::AdoptAll).is_ok());
    }

    #[test]
    fn prune_of_foreign_object_only_under_adopt_all() {
        let obj = owned_by(Some("bar"));
        let err = can_prune(&inv(), &obj, InventoryPolicy::AdoptIfNoInventory).unwrap_err();
        assert_eq!(err.strategy, ActuationStrategy::Delete);
        assert_eq!(err.status, IdMatchStatus::NoMatch);
        assert!(can_prune(&inv(), &obj, InventoryPolicy::AdoptAll).is_ok());
    }

    #[test]
    fn absent_annotation_applies_unless_must_match() {
        let obj = owned_by(None);
        let err = can_apply(&inv(), Some(&obj), InventoryPolicy::MustMatch).unwrap_err();
        assert_eq!(err.status, IdMatchStatus::Empty);
        assert!(can_apply(&inv(), Some(&obj), InventoryPolicy::AdoptIfNoInventory).is_ok());
    }

    #[test]
    fn new_objects_are_always_allowed() {
        assert!(can_apply(&inv(), None, InventoryPolicy::MustMatch).is_ok());
    }

    #[test]
    fn policy_parses_kebab_case() {
        assert_eq!(
            "adopt-if-no-inventory".parse::<InventoryPolicy>(),
            Ok(InventoryPolicy::AdoptIfNoInventory)
        );
    }
}
