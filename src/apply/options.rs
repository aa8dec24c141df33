// src/apply/options.rs

use std::time::Duration;

use crate::engine::RunnerOptions;
use crate::inventory::InventoryPolicy;
use crate::polling::PollOptions;
use crate::types::{DryRunStrategy, ErrorAggregation, WaitTimeoutBehaviour};

pub const DEFAULT_PARALLELISM: usize = 4;
pub const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct ApplierOptions {
    pub inventory_policy: InventoryPolicy,
    /// How long each apply wait may take. `None` waits only between layers,
    /// without a deadline.
    pub reconcile_timeout: Option<Duration>,
    pub prune_timeout: Option<Duration>,
    /// Remove previously owned objects that are no longer desired.
    pub prune: bool,
    pub wait_timeout_behaviour: WaitTimeoutBehaviour,
    pub emit_status_events: bool,
    pub dry_run: DryRunStrategy,
    pub parallelism: usize,
    pub error_aggregation: ErrorAggregation,
    pub poll: PollOptions,
    pub event_buffer: usize,
}

impl Default for ApplierOptions {
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
            poll: PollOptions::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ApplierOptions {
    pub(crate) fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            emit_status_events: self.emit_status_events,
            wait_timeout_behaviour: self.wait_timeout_behaviour,
            error_aggregation: self.error_aggregation,
            poll: self.poll.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DestroyerOptions {
    pub inventory_policy: InventoryPolicy,
    pub delete_timeout: Option<Duration>,
    pub wait_timeout_behaviour: WaitTimeoutBehaviour,
    pub emit_status_events: bool,
    pub dry_run: DryRunStrategy,
    pub parallelism: usize,
    pub error_aggregation: ErrorAggregation,
    pub poll: PollOptions,
    pub event_buffer: usize,
}

impl Default for DestroyerOptions {
    fn default() -> Self {
        Self {
            inventory_policy: InventoryPolicy::default(),
            delete_timeout: None,
            wait_timeout_behaviour: WaitTimeoutBehaviour::default(),
            emit_status_events: true,
            dry_run: DryRunStrategy::default(),
            parallelism: DEFAULT_PARALLELISM,
            error_aggregation: ErrorAggregation::default(),
            poll: PollOptions::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl DestroyerOptions {
    pub(crate) fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            emit_status_events: self.emit_status_events,
            wait_timeout_behaviour: self.wait_timeout_behaviour,
            error_aggregation: self.error_aggregation,
            poll: self.poll.clone(),
        }
    }
}
