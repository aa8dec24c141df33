// src/polling/mod.rs

//! Status polling.
//!
//! A [`Poller`] turns a set of identifiers into a stream of [`PollEvent`]s.
//! [`StatusPoller`] is the real implementation over a
//! [`ClusterReader`](crate::cluster::ClusterReader); tests can substitute a
//! scripted one.

pub mod cache;
pub mod poller;

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::ErrorKind;
use crate::object::{ObjMetadata, ObjMetadataSet};
use crate::status::Status;
use crate::types::ReadStrategy;

pub use cache::{Change, StatusCache};
pub use poller::StatusPoller;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_FETCH_FAILURES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    pub poll_interval: Duration,
    pub read_strategy: ReadStrategy,
    /// Reuse the previous result for objects whose resourceVersion did not
    /// change since the last tick.
    pub use_cache: bool,
    /// Consecutive read failures tolerated before an Error event.
    pub max_fetch_failures: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_strategy: ReadStrategy::default(),
            use_cache: true,
            max_fetch_failures: DEFAULT_MAX_FETCH_FAILURES,
        }
    }
}

/// Observed status of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub id: ObjMetadata,
    pub status: Status,
    pub message: String,
    /// `metadata.generation` of the object that was read, if it exists.
    pub generation: Option<i64>,
}

impl ResourceStatus {
    pub fn not_found(id: ObjMetadata) -> Self {
        Self {
            id,
            status: Status::NotFound,
            message: "Resource not found".to_string(),
            generation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// First observation of a resource, or a change of its verdict.
    ResourceUpdate(ResourceStatus),
    /// Same verdict as last reported, read from a newer generation.
    GenerationUpdate(ResourceStatus),
    /// Reading or evaluating one resource failed.
    Error {
        id: ObjMetadata,
        kind: ErrorKind,
        message: String,
    },
    /// Every identifier has been polled at least once.
    Sync,
}

pub trait Poller: Send + Sync {
    /// Start polling `ids` until `cancel` fires. The returned stream closes
    /// once polling stops.
    fn poll(
        &self,
        cancel: CancellationToken,
        ids: ObjMetadataSet,
        options: PollOptions,
    ) -> mpsc::Receiver<PollEvent>;
}
