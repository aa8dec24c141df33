// src/polling/cache.rs

use std::collections::HashMap;

use tracing::trace;

use crate::object::ObjMetadata;
use crate::polling::ResourceStatus;
use crate::status::Status;

/// What an observation changed compared to the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    None,
    /// Same verdict, but computed from a different generation.
    Generation,
    /// First observation or a new verdict.
    Verdict,
}

#[derive(Debug, Default)]
struct Entry {
    /// Last verdict emitted for this object.
    emitted: Option<Status>,
    /// Generation the emitted verdict was computed from.
    generation: Option<i64>,
    /// Last computed result and the resourceVersion it was computed from.
    computed: Option<(String, ResourceStatus)>,
    /// Last error message emitted for this object.
    error: Option<String>,
}

/// Per-object poll memory.
///
/// Owned by the poller task; tracks what was already emitted so each tick
/// only reports changes, and remembers computed results by resourceVersion.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: HashMap<ObjMetadata, Entry>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Previously computed result, if the object has not changed since.
    pub fn computed_for(&self, id: &ObjMetadata, resource_version: &str) -> Option<&ResourceStatus> {
        let (rv, status) = self.entries.get(id)?.computed.as_ref()?;
        (rv == resource_version).then_some(status)
    }

    pub fn store_computed(&mut self, resource_version: &str, status: ResourceStatus) {
        let entry = self.entries.entry(status.id.clone()).or_default();
        entry.computed = Some((resource_version.to_string(), status));
    }

    /// Record an observation and report what it changed.
    pub fn observe(&mut self, status: &ResourceStatus) -> Change {
        let entry = self.entries.entry(status.id.clone()).or_default();
        entry.error = None;
        if entry.emitted == Some(status.status) {
            if entry.generation == status.generation {
                return Change::None;
            }
            trace!(id = %status.id, from = ?entry.generation, to = ?status.generation, "generation changed");
            entry.generation = status.generation;
            return Change::Generation;
        }
        trace!(id = %status.id, from = ?entry.emitted, to = %status.status, "verdict changed");
        entry.emitted = Some(status.status);
        entry.generation = status.generation;
        Change::Verdict
    }

    /// Record an error; returns whether the message differs from the last
    /// emitted one.
    pub fn observe_error(&mut self, id: &ObjMetadata, message: &str) -> bool {
        let entry = self.entries.entry(id.clone()).or_default();
        entry.computed = None;
        if entry.error.as_deref() == Some(message) {
            return false;
        }
        entry.error = Some(message.to_string());
        true
    }

    pub fn last_verdict(&self, id: &ObjMetadata) -> Option<Status> {
        self.entries.get(id).and_then(|e| e.emitted)
    }
}
