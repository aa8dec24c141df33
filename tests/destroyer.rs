use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use kapply::inventory::{ON_REMOVE_KEEP, ON_REMOVE_KEY, OWNING_INVENTORY_KEY};
use kapply::{
    Destroyer, DestroyerOptions, DryRunStrategy, Event, MemoryCluster, MemoryInventoryClient,
    ObjMetadataSet, PollOptions, Unstructured,
};
use kapply_test_utils::builders::{ObjectBuilder, id_of, test_inventory};
use kapply_test_utils::{collect_events, init_tracing, timeline};
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn fast_options() -> DestroyerOptions {
    DestroyerOptions {
        poll: PollOptions {
            poll_interval: Duration::from_millis(20),
            ..PollOptions::default()
        },
        ..DestroyerOptions::default()
    }
}

/// Seed `cluster` and the record with objects owned by the test inventory.
fn seed(cluster: &MemoryCluster, inventory_client: &MemoryInventoryClient, objects: &[Unstructured]) {
    for obj in objects {
        cluster.insert(obj.clone()).expect("insert");
    }
    let ids: ObjMetadataSet = objects.iter().map(id_of).collect();
    inventory_client.insert(&test_inventory(), ids);
}

fn owned_namespace_and_config() -> (Unstructured, Unstructured) {
    let inv = test_inventory();
    let ns = ObjectBuilder::new("v1", "Namespace", "web").owned_by(&inv).build();
    let cm = ObjectBuilder::new("v1", "ConfigMap", "settings")
        .namespace("web")
        .owned_by(&inv)
        .build();
    (ns, cm)
}

fn position(lines: &[String], needle: &str) -> usize {
    lines
        .iter()
        .position(|l| l == needle)
        .unwrap_or_else(|| panic!("missing `{needle}` in {lines:#?}"))
}

#[tokio::test]
async fn deletes_dependents_before_their_dependencies() -> TestResult {
    init_tracing();

    let cluster = MemoryCluster::new();
    let inventory_client = MemoryInventoryClient::new();
    let (ns, cm) = owned_namespace_and_config();
    seed(&cluster, &inventory_client, &[ns, cm]);

    let destroyer = Destroyer::new(
        Arc::new(cluster.clone()),
        Arc::new(inventory_client.clone()),
    );
    let events = collect_events(destroyer.run(
        CancellationToken::new(),
        test_inventory(),
        fast_options(),
    ))
    .await;

    let lines = timeline(&events);
    assert!(position(&lines, "delete settings Successful") < position(&lines, "start wait-0"));
    assert!(position(&lines, "wait settings Successful") < position(&lines, "delete web Successful"));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("finish inventory-delete-or-update-0")
    );

    assert!(cluster.ids().is_empty());
    assert_eq!(inventory_client.snapshot(&test_inventory()), None);
    Ok(())
}

#[tokio::test]
async fn failed_delete_keeps_the_record_and_protects_dependencies() -> TestResult {
    init_tracing();

    let cluster = MemoryCluster::new();
    let inventory_client = MemoryInventoryClient::new();
    let (ns, cm) = owned_namespace_and_config();
    seed(&cluster, &inventory_client, &[ns.clone(), cm.clone()]);
    cluster.fail_delete(id_of(&cm));

    let destroyer = Destroyer::new(
        Arc::new(cluster.clone()),
        Arc::new(inventory_client.clone()),
    );
    let events = collect_events(destroyer.run(
        CancellationToken::new(),
        test_inventory(),
        fast_options(),
    ))
    .await;

    let lines = timeline(&events);
    assert!(lines.contains(&"delete settings Failed".to_string()), "{lines:#?}");
    assert!(lines.contains(&"delete web Skipped".to_string()), "{lines:#?}");

    let remaining: ObjMetadataSet = [id_of(&ns), id_of(&cm)].into_iter().collect();
    assert_eq!(inventory_client.snapshot(&test_inventory()), Some(remaining));
    assert_eq!(cluster.ids().len(), 2);
    Ok(())
}

#[tokio::test]
async fn kept_objects_are_detached_not_deleted() -> TestResult {
    init_tracing();

    let cluster = MemoryCluster::new();
    let inventory_client = MemoryInventoryClient::new();
    let keep = ObjectBuilder::new("v1", "ConfigMap", "keep")
        .namespace("default")
        .owned_by(&test_inventory())
        .annotation(ON_REMOVE_KEY, ON_REMOVE_KEEP)
        .build();
    seed(&cluster, &inventory_client, std::slice::from_ref(&keep));

    let destroyer = Destroyer::new(
        Arc::new(cluster.clone()),
        Arc::new(inventory_client.clone()),
    );
    let events = collect_events(destroyer.run(
        CancellationToken::new(),
        test_inventory(),
        fast_options(),
    ))
    .await;

    let delete_error = events.iter().find_map(|e| match e {
        Event::Delete { error, .. } => Some(error.clone()),
        _ => None,
    });
    assert_eq!(delete_error, Some(None));
    assert!(timeline(&events).contains(&"delete keep Skipped".to_string()));

    let stored = cluster.object(&id_of(&keep)).ok_or("kept object was deleted")?;
    assert_eq!(stored.annotation(OWNING_INVENTORY_KEY), None);
    assert_eq!(inventory_client.snapshot(&test_inventory()), None);
    Ok(())
}

#[tokio::test]
async fn dry_run_changes_nothing() -> TestResult {
    init_tracing();

    let cluster = MemoryCluster::new();
    let inventory_client = MemoryInventoryClient::new();
    let (ns, cm) = owned_namespace_and_config();
    seed(&cluster, &inventory_client, &[ns, cm]);

    let destroyer = Destroyer::new(
        Arc::new(cluster.clone()),
        Arc::new(inventory_client.clone()),
    );
    let events = collect_events(destroyer.run(
        CancellationToken::new(),
        test_inventory(),
        DestroyerOptions {
            dry_run: DryRunStrategy::Client,
            ..fast_options()
        },
    ))
    .await;

    let lines = timeline(&events);
    assert!(!lines.iter().any(|l| l.starts_with("start wait")), "{lines:#?}");
    assert!(lines.contains(&"delete web Successful".to_string()), "{lines:#?}");
    assert_eq!(cluster.ids().len(), 2);
    assert_eq!(
        inventory_client.snapshot(&test_inventory()).map(|s| s.len()),
        Some(2)
    );
    Ok(())
}
