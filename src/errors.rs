// src/errors.rs

//! Crate-wide error type, result alias and error classification.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::inventory::PolicyPreventedActuation;
use crate::object::ObjMetadata;

#[derive(Error, Debug)]
pub enum KapplyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("invalid field {path}: {message}")]
    InvalidField { path: String, message: String },

    #[error("invalid annotation {key} on {id}: {message}")]
    InvalidAnnotation {
        key: String,
        id: ObjMetadata,
        message: String,
    },

    #[error("duplicate object in resource set: {0}")]
    DuplicateObject(ObjMetadata),

    #[error("dependency cycle detected involving {0}")]
    DependencyCycle(ObjMetadata),

    #[error(transparent)]
    PolicyPrevented(#[from] PolicyPreventedActuation),

    #[error("dependency {dependency} of {id} failed or was skipped")]
    DependencyFailed {
        id: ObjMetadata,
        dependency: ObjMetadata,
    },

    #[error("{dependent} still depends on {id}")]
    DependentRemains {
        id: ObjMetadata,
        dependent: ObjMetadata,
    },

    #[error("apply of {id} failed: {message}")]
    Apply { id: ObjMetadata, message: String },

    #[error("delete of {id} failed: {message}")]
    Delete { id: ObjMetadata, message: String },

    #[error("fetch of {id} failed: {message}")]
    Fetch { id: ObjMetadata, message: String },

    #[error("cluster request failed: {0}")]
    Cluster(String),

    #[error("inventory {name}: {message}")]
    Inventory { name: String, message: String },

    #[error("timed out after {timeout:?} waiting for {pending} resource(s) in {task}")]
    WaitTimeout {
        task: String,
        timeout: Duration,
        pending: usize,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("run finished with {failures} failed or skipped operation(s)")]
    RunFailed { failures: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error classification carried on events.
///
/// Printers use this to tell policy rejections from timeouts or fatal
/// infrastructure failures without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Config,
    InvalidObject,
    InvalidField,
    DependencyCycle,
    PolicyPrevented,
    DependencyFailed,
    Apply,
    Delete,
    Fetch,
    Inventory,
    WaitTimeout,
    Cancelled,
    RunFailed,
    Internal,
}

impl KapplyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KapplyError::ConfigError(_) | KapplyError::IoError(_) | KapplyError::TomlError(_) => {
                ErrorKind::Config
            }
            KapplyError::InvalidObject(_)
            | KapplyError::InvalidAnnotation { .. }
            | KapplyError::DuplicateObject(_) => ErrorKind::InvalidObject,
            KapplyError::InvalidField { .. } => ErrorKind::InvalidField,
            KapplyError::DependencyCycle(_) => ErrorKind::DependencyCycle,
            KapplyError::PolicyPrevented(_) => ErrorKind::PolicyPrevented,
            KapplyError::DependencyFailed { .. } | KapplyError::DependentRemains { .. } => {
                ErrorKind::DependencyFailed
            }
            KapplyError::Apply { .. } => ErrorKind::Apply,
            KapplyError::Delete { .. } => ErrorKind::Delete,
            KapplyError::Fetch { .. } | KapplyError::Cluster(_) => ErrorKind::Fetch,
            KapplyError::Inventory { .. } => ErrorKind::Inventory,
            KapplyError::WaitTimeout { .. } => ErrorKind::WaitTimeout,
            KapplyError::Cancelled => ErrorKind::Cancelled,
            KapplyError::RunFailed { .. } => ErrorKind::RunFailed,
            KapplyError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error aborts every remaining stage of a run.
    ///
    /// Wait timeouts are not fatal by themselves; the runner consults
    /// its `WaitTimeoutBehaviour` for those.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KapplyError::Inventory { .. }
                | KapplyError::Cancelled
                | KapplyError::DependencyCycle(_)
                | KapplyError::DuplicateObject(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, KapplyError::WaitTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, KapplyError>;
