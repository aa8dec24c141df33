// src/object/mod.rs

//! Resource object model.
//!
//! - [`id`] holds identifiers (`ObjMetadata`, `GroupKind`).
//! - [`set`] is the ordered, duplicate-free identifier set.
//! - [`unstructured`] wraps a JSON object with field helpers.
//! - [`depends_on`] parses explicit ordering annotations.

pub mod depends_on;
pub mod id;
pub mod set;
pub mod unstructured;

pub use depends_on::{DEPENDS_ON_ANNOTATION, dependencies_of, format_reference};
pub use id::{GroupKind, ObjMetadata};
pub use set::ObjMetadataSet;
pub use unstructured::Unstructured;

use crate::errors::{KapplyError, Result};

/// Identifiers of `objects`, rejecting duplicates.
pub fn unique_ids(objects: &[Unstructured]) -> Result<ObjMetadataSet> {
    let mut set = ObjMetadataSet::new();
    for obj in objects {
        let id = obj.id()?;
        if !set.insert(id.clone()) {
            return Err(KapplyError::DuplicateObject(id));
        }
    }
    Ok(set)
}
