// src/object/set.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::object::ObjMetadata;

/// Insertion-ordered set of resource identifiers.
///
/// Order matters for deterministic plans and event output, so this keeps a
/// `Vec` for iteration and a `HashSet` for membership checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ObjMetadata>", into = "Vec<ObjMetadata>")]
pub struct ObjMetadataSet {
    items: Vec<ObjMetadata>,
    index: HashSet<ObjMetadata>,
}

impl ObjMetadataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `id`; returns `false` if it was already present.
    pub fn insert(&mut self, id: ObjMetadata) -> bool {
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.items.push(id);
        true
    }

    pub fn remove(&mut self, id: &ObjMetadata) -> bool {
        if !self.index.remove(id) {
            return false;
        }
        self.items.retain(|item| item != id);
        true
    }

    pub fn contains(&self, id: &ObjMetadata) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjMetadata> {
        self.items.iter()
    }

    /// Members of `self` followed by members of `other` not already present.
    pub fn union(&self, other: &ObjMetadataSet) -> ObjMetadataSet {
        let mut out = self.clone();
        for id in other.iter() {
            out.insert(id.clone());
        }
        out
    }

    /// Members of `self` that are not in `other`, in `self` order.
    pub fn difference(&self, other: &ObjMetadataSet) -> ObjMetadataSet {
        self.iter().filter(|id| !other.contains(id)).cloned().collect()
    }

    pub fn intersection(&self, other: &ObjMetadataSet) -> ObjMetadataSet {
        self.iter().filter(|id| other.contains(id)).cloned().collect()
    }

    /// Same members regardless of order.
    pub fn same_members(&self, other: &ObjMetadataSet) -> bool {
        self.len() == other.len() && self.iter().all(|id| other.contains(id))
    }

    pub fn to_vec(&self) -> Vec<ObjMetadata> {
        self.items.clone()
    }
}

impl PartialEq for ObjMetadataSet {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for ObjMetadataSet {}

impl FromIterator<ObjMetadata> for ObjMetadataSet {
    fn from_iter<T: IntoIterator<Item = ObjMetadata>>(iter: T) -> Self {
        let mut set = ObjMetadataSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl From<Vec<ObjMetadata>> for ObjMetadataSet {
    fn from(items: Vec<ObjMetadata>) -> Self {
        items.into_iter().collect()
    }
}

impl From<ObjMetadataSet> for Vec<ObjMetadata> {
    fn from(set: ObjMetadataSet) -> Self {
        set.items
    }
}

impl<'a> IntoIterator for &'a ObjMetadataSet {
    type Item = &'a ObjMetadata;
    type IntoIter = std::slice::Iter<'a, ObjMetadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cm(name: &str) -> ObjMetadata {
        ObjMetadata::new("", "ConfigMap", "default", name)
    }

    #[test]
    fn insert_ignores_duplicates_and_keeps_order() {
        let mut set = ObjMetadataSet::new();
        assert!(set.insert(cm("b")));
        assert!(set.insert(cm("a")));
        assert!(!set.insert(cm("b")));

        assert_eq!(set.to_vec(), vec![cm("b"), cm("a")]);
    }

    #[test]
    fn difference_and_union() {
        let prev: ObjMetadataSet = vec![cm("a"), cm("b"), cm("c")].into();
        let next: ObjMetadataSet = vec![cm("b"), cm("d")].into();

        assert_eq!(prev.difference(&next).to_vec(), vec![cm("a"), cm("c")]);
        assert_eq!(
            prev.union(&next).to_vec(),
            vec![cm("a"), cm("b"), cm("c"), cm("d")]
        );
        assert_eq!(prev.intersection(&next).to_vec(), vec![cm("b")]);
    }

    #[test]
    fn remove_updates_both_views() {
        let mut set: ObjMetadataSet = vec![cm("a"), cm("b")].into();
        assert!(set.remove(&cm("a")));
        assert!(!set.contains(&cm("a")));
        assert_eq!(set.len(), 1);
        assert!(!set.remove(&cm("a")));
    }
}
