// src/config/model.rs

use serde::Deserialize;

use crate::apply::options::{DEFAULT_EVENT_BUFFER, DEFAULT_PARALLELISM};
use crate::apply::{ApplierOptions, DestroyerOptions};
use crate::inventory::InventoryPolicy;
use crate::polling::{DEFAULT_MAX_FETCH_FAILURES, PollOptions};
use crate::types::{DryRunStrategy, ErrorAggregation, ReadStrategy, WaitTimeoutBehaviour};

/// Options file as read from TOML, before validation.
///
/// ```toml
/// [apply]
/// inventory_policy = "adopt-if-no-inventory"
/// reconcile_timeout = "2m"
/// parallelism = 8
///
/// [destroy]
/// delete_timeout = "1m"
///
/// [poll]
/// interval = "2s"
/// read_strategy = "batched"
/// ```
///
/// Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub apply: RawApplySection,

    #[serde(default)]
    pub destroy: RawDestroySection,

    #[serde(default)]
    pub poll: RawPollSection,
}

/// `[apply]` section. Durations are strings like `"90s"`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawApplySection {
    #[serde(default)]
    pub inventory_policy: InventoryPolicy,

    #[serde(default)]
    pub reconcile_timeout: Option<String>,

    #[serde(default)]
    pub prune_timeout: Option<String>,

    #[serde(default = "default_true")]
    pub prune: bool,

    #[serde(default)]
    pub wait_timeout_behaviour: WaitTimeoutBehaviour,

    #[serde(default = "default_true")]
    pub emit_status_events: bool,

    #[serde(default)]
    pub dry_run: DryRunStrategy,

    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    #[serde(default)]
    pub error_aggregation: ErrorAggregation,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for RawApplySection {
    fn default() -> Self {
        Self {
            inventory_policy: InventoryPolicy::default(),
            reconcile_timeout: None,
            prune_timeout: None,
            prune: true,
            wait_timeout_behaviour: WaitTimeoutBehaviour::default(),
            emit_status_events: true,
            dry_run: DryRunStrategy::default(),
            parallelism: DEFAULT_PARALLELISM,
            error_aggregation: ErrorAggregation::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// `[destroy]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDestroySection {
    #[serde(default)]
    pub inventory_policy: InventoryPolicy,

    #[serde(default)]
    pub delete_timeout: Option<String>,

    #[serde(default)]
    pub wait_timeout_behaviour: WaitTimeoutBehaviour,

    #[serde(default = "default_true")]
    pub emit_status_events: bool,

    #[serde(default)]
    pub dry_run: DryRunStrategy,

    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    #[serde(default)]
    pub error_aggregation: ErrorAggregation,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for RawDestroySection {
    fn default() -> Self {
        Self {
            inventory_policy: InventoryPolicy::default(),
            delete_timeout: None,
            wait_timeout_behaviour: WaitTimeoutBehaviour::default(),
            emit_status_events: true,
            dry_run: DryRunStrategy::default(),
            parallelism: DEFAULT_PARALLELISM,
            error_aggregation: ErrorAggregation::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// `[poll]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPollSection {
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default)]
    pub read_strategy: ReadStrategy,

    #[serde(default = "default_true")]
    pub use_cache: bool,

    #[serde(default = "default_max_fetch_failures")]
    pub max_fetch_failures: u32,
}

impl Default for RawPollSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            read_strategy: ReadStrategy::default(),
            use_cache: true,
            max_fetch_failures: DEFAULT_MAX_FETCH_FAILURES,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_interval() -> String {
    "2s".to_string()
}

fn default_max_fetch_failures() -> u32 {
    DEFAULT_MAX_FETCH_FAILURES
}

/// Validated options file. Built from [`RawConfigFile`] via `TryFrom`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub apply: ApplierOptions,
    pub destroy: DestroyerOptions,
    pub poll: PollOptions,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        apply: ApplierOptions,
        destroy: DestroyerOptions,
        poll: PollOptions,
    ) -> Self {
        Self {
            apply,
            destroy,
            poll,
        }
    }

    pub fn applier_options(&self) -> ApplierOptions {
        self.apply.clone()
    }

    pub fn destroyer_options(&self) -> DestroyerOptions {
        self.destroy.clone()
    }

    pub fn poll_options(&self) -> PollOptions {
        self.poll.clone()
    }
}
