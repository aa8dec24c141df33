// src/apply/destroyer.rs

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::apply::{
    DestroyerOptions, SharedCluster, fetch_live, load_inventory, next_run_id, removal_graph,
};
use crate::dag::{DependencyGraph, reverse_layers};
use crate::engine::TaskRunner;
use crate::errors::Result;
use crate::event::{Event, EventSender};
use crate::inventory::{InventoryClient, InventoryInfo};
use crate::object::ObjMetadataSet;
use crate::polling::{Poller, StatusPoller};
use crate::status::StatusComputer;
use crate::task::{Stage, TaskContext, TaskContextParts, TaskQueueBuilder};

/// Deletes everything an inventory owns, then the inventory record itself.
pub struct Destroyer {
    cluster: SharedCluster,
    inventory_client: Arc<dyn InventoryClient>,
    poller: Arc<dyn Poller>,
}

impl std::fmt::Debug for Destroyer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destroyer").finish_non_exhaustive()
    }
}

struct DestroyPlan {
    stages: Vec<Stage>,
    graph: DependencyGraph,
    members: ObjMetadataSet,
}

impl Destroyer {
    pub fn new(cluster: SharedCluster, inventory_client: Arc<dyn InventoryClient>) -> Self {
        let poller = StatusPoller::new(Arc::clone(&cluster), StatusComputer::default());
        Self {
            cluster,
            inventory_client,
            poller: Arc::new(poller),
        }
    }

    pub fn with_poller(mut self, poller: Arc<dyn Poller>) -> Self {
        self.poller = poller;
        self
    }

    /// Start destroying every member of `inv`.
    ///
    /// Members are read back from the cluster to recover their dependency
    /// order; members that are already gone still get a delete task.
    pub fn run(
        &self,
        cancel: CancellationToken,
        inv: InventoryInfo,
        options: DestroyerOptions,
    ) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(options.event_buffer.max(1));
        let events = EventSender::new(tx);
        let span = info_span!("destroy", run_id = next_run_id(), inventory = %inv.name);

        let cluster = Arc::clone(&self.cluster);
        let inventory_client = Arc::clone(&self.inventory_client);
        let runner = TaskRunner::new(Arc::clone(&self.poller), options.runner_options());

        tokio::spawn(
            async move {
                let plan = match plan_destroy(&cluster, &*inventory_client, &inv, &options).await {
                    Ok(plan) => plan,
                    Err(err) => {
                        error!(error = %err, "destroy rejected before any task ran");
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
                let summary = runner.run(ctx, plan.stages, plan.members).await;
                info!(?summary, "destroy finished");
            }
            .instrument(span),
        );

        rx
    }
}

async fn plan_destroy(
    cluster: &SharedCluster,
    inventory_client: &dyn InventoryClient,
    inv: &InventoryInfo,
    options: &DestroyerOptions,
) -> Result<DestroyPlan> {
    let members = load_inventory(inventory_client, inv).await?;
    debug!(members = members.len(), "resolved inventory");

    let live = fetch_live(cluster.as_ref(), &members).await;
    let graph = removal_graph(&live, &members);
    let delete_layers = reverse_layers(&graph)?;

    let stages = TaskQueueBuilder::new(options.dry_run.is_dry_run())
        .delete_layers(delete_layers, options.delete_timeout)
        .inventory_delete_or_update(members.clone())
        .build();

    Ok(DestroyPlan {
        stages,
        graph,
        members,
    })
}
