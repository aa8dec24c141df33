// src/lib.rs

//! Apply and destroy sets of cluster objects with ownership tracking,
//! dependency ordering and readiness waits.
//!
//! Callers hand an [`Applier`] or [`Destroyer`] a cluster client, an
//! inventory client and their objects, and read one ordered stream of
//! [`Event`]s back.

pub mod apply;
pub mod cluster;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod event;
pub mod inventory;
pub mod logging;
pub mod object;
pub mod polling;
pub mod status;
pub mod task;
pub mod types;

pub use apply::{Applier, ApplierOptions, Destroyer, DestroyerOptions};
pub use cluster::{ClusterClient, ClusterReader, MemoryCluster};
pub use errors::{ErrorKind, KapplyError, Result};
pub use event::{ActionGroup, ActionKind, ActuationStatus, Event, EventError, WaitStatus};
pub use inventory::{InventoryClient, InventoryInfo, InventoryPolicy, MemoryInventoryClient};
pub use object::{GroupKind, ObjMetadata, ObjMetadataSet, Unstructured};
pub use polling::{PollEvent, PollOptions, Poller, ResourceStatus, StatusPoller};
pub use status::{Status, StatusComputer, StatusResult, StatusRuleRegistry};
pub use task::RunSummary;
pub use types::{DryRunStrategy, ErrorAggregation, ReadStrategy, WaitTimeoutBehaviour};
