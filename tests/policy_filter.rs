use std::sync::Arc;
use std::time::Duration;

use kapply::inventory::{InventoryInfo, OWNING_INVENTORY_KEY};
use kapply::{
    Applier, ApplierOptions, ErrorAggregation, ErrorKind, Event, InventoryPolicy, MemoryCluster,
    MemoryInventoryClient, ObjMetadataSet, PollOptions,
};
use kapply_test_utils::builders::{ObjectBuilder, configmap, id_of, test_inventory};
use kapply_test_utils::{collect_events, init_tracing, timeline};
use tokio_util::sync::CancellationToken;

fn other_inventory() -> InventoryInfo {
    InventoryInfo::new("other", "default", "other-inventory-id")
}

fn options(policy: InventoryPolicy) -> ApplierOptions {
    ApplierOptions {
        inventory_policy: policy,
        poll: PollOptions {
            poll_interval: Duration::from_millis(20),
            ..PollOptions::default()
        },
        ..ApplierOptions::default()
    }
}

/// A cluster where `shared` already belongs to another inventory.
fn cluster_with_foreign_object() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    let foreign = ObjectBuilder::new("v1", "ConfigMap", "shared")
        .namespace("default")
        .owned_by(&other_inventory())
        .build();
    cluster.insert(foreign).expect("insert");
    cluster
}

fn apply_error_kind(events: &[Event], name: &str) -> Option<ErrorKind> {
    events.iter().find_map(|e| match e {
        Event::Apply { id, error, .. } if id.name == name => error.as_ref().map(|e| e.kind),
        _ => None,
    })
}

#[tokio::test]
async fn must_match_skips_objects_owned_elsewhere() {
    init_tracing();

    let cluster = cluster_with_foreign_object();
    let inventory_client = MemoryInventoryClient::new();
    let applier = Applier::new(
        Arc::new(cluster.clone()),
        Arc::new(inventory_client.clone()),
    );
    let inv = test_inventory();

    let shared = configmap("shared", "default");
    let dependent = ObjectBuilder::new("v1", "ConfigMap", "dependent")
        .namespace("default")
        .depends_on(&[&id_of(&shared)])
        .build();
    let independent = configmap("independent", "default");

    let events = collect_events(applier.run(
        CancellationToken::new(),
        inv.clone(),
        vec![shared.clone(), dependent, independent.clone()],
        options(InventoryPolicy::MustMatch),
    ))
    .await;

    let lines = timeline(&events);
    assert!(lines.contains(&"apply shared Skipped".to_string()), "{lines:#?}");
    assert!(lines.contains(&"apply independent Successful".to_string()), "{lines:#?}");
    assert!(lines.contains(&"wait shared Skipped".to_string()), "{lines:#?}");
    assert!(lines.contains(&"apply dependent Skipped".to_string()), "{lines:#?}");
    assert_eq!(
        apply_error_kind(&events, "shared"),
        Some(ErrorKind::PolicyPrevented)
    );
    assert_eq!(
        apply_error_kind(&events, "dependent"),
        Some(ErrorKind::DependencyFailed)
    );

    let stored = cluster.object(&id_of(&shared)).expect("still there");
    assert_eq!(
        stored.annotation(OWNING_INVENTORY_KEY),
        Some(other_inventory().id.as_str())
    );

    // Only what was actually applied is recorded.
    let recorded: ObjMetadataSet = [id_of(&independent)].into_iter().collect();
    assert_eq!(inventory_client.snapshot(&inv), Some(recorded));
}

#[tokio::test]
async fn adopt_all_takes_over_foreign_objects() {
    init_tracing();

    let cluster = cluster_with_foreign_object();
    let applier = Applier::new(
        Arc::new(cluster.clone()),
        Arc::new(MemoryInventoryClient::new()),
    );
    let inv = test_inventory();
    let shared = configmap("shared", "default");

    let events = collect_events(applier.run(
        CancellationToken::new(),
        inv.clone(),
        vec![shared.clone()],
        options(InventoryPolicy::AdoptAll),
    ))
    .await;

    assert!(timeline(&events).contains(&"apply shared Successful".to_string()));
    let stored = cluster.object(&id_of(&shared)).expect("still there");
    assert_eq!(stored.annotation(OWNING_INVENTORY_KEY), Some(inv.id.as_str()));
}

#[tokio::test]
async fn adopt_if_no_inventory_still_refuses_foreign_objects() {
    init_tracing();

    let cluster = cluster_with_foreign_object();
    cluster
        .insert(configmap("unowned", "default"))
        .expect("insert");
    let applier = Applier::new(Arc::new(cluster), Arc::new(MemoryInventoryClient::new()));

    let events = collect_events(applier.run(
        CancellationToken::new(),
        test_inventory(),
        vec![configmap("shared", "default"), configmap("unowned", "default")],
        options(InventoryPolicy::AdoptIfNoInventory),
    ))
    .await;

    let lines = timeline(&events);
    assert!(lines.contains(&"apply shared Skipped".to_string()), "{lines:#?}");
    assert!(lines.contains(&"apply unowned Successful".to_string()), "{lines:#?}");
}

#[tokio::test]
async fn any_error_aggregation_reports_skips_at_the_end() {
    init_tracing();

    let applier = Applier::new(
        Arc::new(cluster_with_foreign_object()),
        Arc::new(MemoryInventoryClient::new()),
    );
    let events = collect_events(applier.run(
        CancellationToken::new(),
        test_inventory(),
        vec![configmap("shared", "default")],
        ApplierOptions {
            error_aggregation: ErrorAggregation::AnyError,
            ..options(InventoryPolicy::MustMatch)
        },
    ))
    .await;

    assert_eq!(
        timeline(&events).last().map(String::as_str),
        Some("error RunFailed fatal=false")
    );
}
