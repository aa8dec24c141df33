// src/task/context.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cluster::ClusterClient;
use crate::dag::DependencyGraph;
use crate::event::EventSender;
use crate::inventory::{InventoryClient, InventoryInfo, InventoryPolicy};
use crate::object::ObjMetadata;
use crate::polling::ResourceStatus;
use crate::task::tracker::{ObjectTracker, RunCounters, Tally};
use crate::types::DryRunStrategy;

const STATUS_FEED_CAPACITY: usize = 1024;

/// Shared state for every task of one run.
pub struct TaskContext {
    pub cluster: Arc<dyn ClusterClient>,
    pub inventory_client: Arc<dyn InventoryClient>,
    pub inventory: InventoryInfo,
    pub policy: InventoryPolicy,
    pub dry_run: DryRunStrategy,
    /// Bound on concurrently actuated objects within one task.
    pub parallelism: usize,
    pub graph: DependencyGraph,
    pub events: EventSender,
    pub cancel: CancellationToken,
    pub status: StatusFeed,
    tracker: Mutex<ObjectTracker>,
    counters: RunCounters,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("inventory", &self.inventory)
            .field("policy", &self.policy)
            .field("dry_run", &self.dry_run)
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

pub struct TaskContextParts {
    pub cluster: Arc<dyn ClusterClient>,
    pub inventory_client: Arc<dyn InventoryClient>,
    pub inventory: InventoryInfo,
    pub policy: InventoryPolicy,
    pub dry_run: DryRunStrategy,
    pub parallelism: usize,
    pub graph: DependencyGraph,
    pub events: EventSender,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(parts: TaskContextParts) -> Self {
        Self {
            cluster: parts.cluster,
            inventory_client: parts.inventory_client,
            inventory: parts.inventory,
            policy: parts.policy,
            dry_run: parts.dry_run,
            parallelism: parts.parallelism.max(1),
            graph: parts.graph,
            events: parts.events,
            cancel: parts.cancel,
            status: StatusFeed::new(),
            tracker: Mutex::new(ObjectTracker::new()),
            counters: RunCounters::default(),
        }
    }

    /// Locked access to the per-object tracker. Never hold it across `.await`.
    pub fn tracker(&self) -> MutexGuard<'_, ObjectTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tally(&self, tally: Tally) {
        self.counters.record(tally);
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }
}

/// Fan-out of poller results to wait tasks.
///
/// Keeps the latest status per object so a subscriber that arrives late
/// still sees the current state.
#[derive(Debug)]
pub struct StatusFeed {
    tx: broadcast::Sender<ResourceStatus>,
    latest: Arc<Mutex<HashMap<ObjMetadata, ResourceStatus>>>,
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_FEED_CAPACITY);
        Self {
            tx,
            latest: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn publish(&self, status: ResourceStatus) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(status.id.clone(), status.clone());
        // No subscribers is fine; the latest map still has it.
        let _ = self.tx.send(status);
    }

    pub fn latest(&self, id: &ObjMetadata) -> Option<ResourceStatus> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Subscribe to updates for `ids`, starting with their latest known
    /// statuses.
    pub fn subscribe(&self, ids: impl IntoIterator<Item = ObjMetadata>) -> StatusSubscription {
        // Subscribe before taking the snapshot so nothing falls in between.
        let rx = self.tx.subscribe();
        let ids: HashSet<ObjMetadata> = ids.into_iter().collect();
        let mut subscription = StatusSubscription {
            ids,
            backlog: VecDeque::new(),
            rx,
            latest: Arc::clone(&self.latest),
        };
        subscription.refill_backlog();
        subscription
    }
}

/// Outcome of waiting on a [`StatusSubscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Status(ResourceStatus),
    TimedOut,
    Cancelled,
    /// The feed is gone; no more statuses will arrive.
    Closed,
}

/// Filtered view of the [`StatusFeed`] for one wait task.
#[derive(Debug)]
pub struct StatusSubscription {
    ids: HashSet<ObjMetadata>,
    backlog: VecDeque<ResourceStatus>,
    rx: broadcast::Receiver<ResourceStatus>,
    latest: Arc<Mutex<HashMap<ObjMetadata, ResourceStatus>>>,
}

impl StatusSubscription {
    fn refill_backlog(&mut self) {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        self.backlog.extend(
            latest
                .values()
                .filter(|s| self.ids.contains(&s.id))
                .cloned(),
        );
    }

    /// Next status for a subscribed object, racing `deadline` and `cancel`.
    ///
    /// Cancellation wins over a status that is ready at the same time, and a
    /// status wins over a deadline that has just passed.
    pub async fn next_until(
        &mut self,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Delivery {
        loop {
            if cancel.is_cancelled() {
                return Delivery::Cancelled;
            }
            if let Some(status) = self.backlog.pop_front() {
                return Delivery::Status(status);
            }

            let expired = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Delivery::Cancelled,
                received = self.rx.recv() => received,
                _ = expired => return Delivery::TimedOut,
            };

            match received {
                Ok(status) if self.ids.contains(&status.id) => return Delivery::Status(status),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "status subscriber lagged; resyncing from latest statuses");
                    self.refill_backlog();
                }
                Err(RecvError::Closed) => {
                    debug!("status feed closed");
                    return Delivery::Closed;
                }
            }
        }
    }
}
