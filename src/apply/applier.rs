// src/apply/applier.rs

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::apply::{
    ApplierOptions, SharedCluster, fetch_live, load_inventory, next_run_id, removal_graph,
};
use crate::dag::{DependencyGraph, layers, reverse_layers};
use crate::engine::TaskRunner;
use crate::errors::Result;
use crate::event::{Event, EventSender};
use crate::inventory::{InventoryClient, InventoryInfo};
use crate::object::{ObjMetadata, ObjMetadataSet, Unstructured, unique_ids};
use crate::polling::{Poller, StatusPoller};
use crate::status::StatusComputer;
use crate::task::{Stage, TaskContext, TaskContextParts, TaskQueueBuilder};

/// Applies a set of objects and prunes what the inventory no longer wants.
pub struct Applier {
    cluster: SharedCluster,
    inventory_client: Arc<dyn InventoryClient>,
    poller: Arc<dyn Poller>,
}

impl std::fmt::Debug for Applier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Applier").finish_non_exhaustive()
    }
}

/// Everything the runner needs, worked out before any task starts.
struct ApplyPlan {
    stages: Vec<Stage>,
    graph: DependencyGraph,
    watched: ObjMetadataSet,
}

impl Applier {
    /// Applier polling `cluster` with the built-in status rules.
    pub fn new(cluster: SharedCluster, inventory_client: Arc<dyn InventoryClient>) -> Self {
        let poller = StatusPoller::new(Arc::clone(&cluster), StatusComputer::default());
        Self {
            cluster,
            inventory_client,
            poller: Arc::new(poller),
        }
    }

    /// Replace the status poller, e.g. with one using extra rules.
    pub fn with_poller(mut self, poller: Arc<dyn Poller>) -> Self {
        self.poller = poller;
        self
    }

    /// Start applying `objects` under `inv`. The returned stream closes when
    /// the run is over.
    pub fn run(
        &self,
        cancel: CancellationToken,
        inv: InventoryInfo,
        objects: Vec<Unstructured>,
        options: ApplierOptions,
    ) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(options.event_buffer.max(1));
        let events = EventSender::new(tx);
        let span = info_span!("apply", run_id = next_run_id(), inventory = %inv.name);

        let cluster = Arc::clone(&self.cluster);
        let inventory_client = Arc::clone(&self.inventory_client);
        let runner = TaskRunner::new(Arc::clone(&self.poller), options.runner_options());

        tokio::spawn(
            async move {
                let plan = match plan_apply(&cluster, &*inventory_client, &inv, objects, &options).await {
                    Ok(plan) => plan,
                    Err(err) => {
                        error!(error = %err, "apply rejected before any task ran");
                        events.send(Event::error(&err, true)).await;
                        return;
                    }
                };

                let ctx = Arc::new(TaskContext::new(TaskContextParts {
                    cluster,
                    inventory_client,
                    inventory: inv,
                    policy: options.inventory_policy,
                    dry_run: options.dry_run,
                    parallelism: options.parallelism,
                    graph: plan.graph,
                    events,
                    cancel,
                }));
                let summary = runner.run(ctx, plan.stages, plan.watched).await;
                info!(?summary, "apply finished");
            }
            .instrument(span),
        );

        rx
    }
}

async fn plan_apply(
    cluster: &SharedCluster,
    inventory_client: &dyn InventoryClient,
    inv: &InventoryInfo,
    objects: Vec<Unstructured>,
    options: &ApplierOptions,
) -> Result<ApplyPlan> {
    let desired = unique_ids(&objects)?;
    let apply_graph = DependencyGraph::from_objects(&objects)?;
    let apply_layers = layers(&apply_graph)?;

    let previous = load_inventory(inventory_client, inv).await?;
    let prune_candidates = previous.difference(&desired);
    debug!(
        desired = desired.len(),
        previous = previous.len(),
        stale = prune_candidates.len(),
        "resolved inventory"
    );

    let live = if options.prune && !prune_candidates.is_empty() {
        fetch_live(cluster.as_ref(), &prune_candidates).await
    } else {
        Vec::new()
    };
    let prune_layers = if options.prune {
        reverse_layers(&removal_graph(&live, &prune_candidates))?
    } else {
        Vec::new()
    };

    // One graph for the dependency filters of both phases.
    let mut all_objects = objects.clone();
    all_objects.extend(live);
    let mut graph = DependencyGraph::from_objects(&all_objects).unwrap_or_else(|err| {
        warn!(error = %err, "ignoring dependencies of stale objects");
        apply_graph.clone()
    });
    graph.extend_ids(prune_candidates.iter().cloned());

    let mut by_id: HashMap<ObjMetadata, Unstructured> = HashMap::with_capacity(objects.len());
    for obj in objects {
        by_id.insert(obj.id()?, obj);
    }
    let apply_layers: Vec<Vec<(ObjMetadata, Unstructured)>> = apply_layers
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .filter_map(|id| by_id.remove(&id).map(|obj| (id, obj)))
                .collect()
        })
        .collect();

    let mut builder = TaskQueueBuilder::new(options.dry_run.is_dry_run());
    builder
        .inventory_add(previous.clone(), desired.clone())
        .apply_layers(apply_layers, options.reconcile_timeout);
    if options.prune {
        builder.prune_layers(prune_layers, options.prune_timeout);
    }
    builder.inventory_set(previous, desired.clone(), prune_candidates.clone());

    let watched = if options.prune {
        desired.union(&prune_candidates)
    } else {
        desired
    };

    Ok(ApplyPlan {
        stages: builder.build(),
        graph,
        watched,
    })
}
