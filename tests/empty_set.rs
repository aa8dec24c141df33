use std::sync::Arc;

use kapply::{
    Applier, ApplierOptions, Destroyer, DestroyerOptions, MemoryCluster, MemoryInventoryClient,
    ObjMetadataSet,
};
use kapply_test_utils::builders::test_inventory;
use kapply_test_utils::{collect_events, init_tracing, timeline};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn applying_nothing_only_touches_the_record() {
    init_tracing();

    let inventory_client = MemoryInventoryClient::new();
    let applier = Applier::new(
        Arc::new(MemoryCluster::new()),
        Arc::new(inventory_client.clone()),
    );
    let inv = test_inventory();

    let events = collect_events(applier.run(
        CancellationToken::new(),
        inv.clone(),
        Vec::new(),
        ApplierOptions::default(),
    ))
    .await;

    assert_eq!(
        timeline(&events),
        vec![
            "init",
            "start inventory-add-0",
            "finish inventory-add-0",
            "start inventory-set-0",
            "finish inventory-set-0",
        ]
    );
    assert_eq!(inventory_client.snapshot(&inv), Some(ObjMetadataSet::new()));
}

#[tokio::test]
async fn destroying_an_empty_record_deletes_it() {
    init_tracing();

    let inventory_client = MemoryInventoryClient::new();
    let inv = test_inventory();
    inventory_client.insert(&inv, ObjMetadataSet::new());

    let destroyer = Destroyer::new(
        Arc::new(MemoryCluster::new()),
        Arc::new(inventory_client.clone()),
    );
    let events = collect_events(destroyer.run(
        CancellationToken::new(),
        inv.clone(),
        DestroyerOptions::default(),
    ))
    .await;

    assert_eq!(
        timeline(&events),
        vec![
            "init",
            "start inventory-delete-or-update-0",
            "finish inventory-delete-or-update-0",
        ]
    );
    assert_eq!(inventory_client.snapshot(&inv), None);
}
