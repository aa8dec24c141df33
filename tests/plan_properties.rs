use std::collections::{HashMap, HashSet};
use std::time::Duration;

use kapply::dag::{DependencyGraph, layers, reverse_layers};
use kapply::task::{TaskQueueBuilder, action_groups};
use kapply::{ActionKind, ObjMetadata};
use proptest::prelude::*;

fn object(i: usize) -> ObjMetadata {
    ObjMetadata::new("", "ConfigMap", "default", format!("cm-{i}"))
}

// Acyclic by construction: object N may only depend on objects 0..N-1.
fn acyclic_graph_strategy(max_objects: usize) -> impl Strategy<Value = DependencyGraph> {
    (1..=max_objects).prop_flat_map(|count| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..count),
            count,
        )
        .prop_map(move |raw_deps| {
            let mut edges = Vec::new();
            for (i, potential) in raw_deps.into_iter().enumerate() {
                if i == 0 {
                    continue;
                }
                let deps: HashSet<usize> = potential.into_iter().map(|d| d % i).collect();
                edges.extend(deps.into_iter().map(|d| (object(i), object(d))));
            }
            DependencyGraph::from_edges((0..count).map(object), edges)
        })
    })
}

fn layer_index(layers: &[Vec<ObjMetadata>]) -> HashMap<ObjMetadata, usize> {
    layers
        .iter()
        .enumerate()
        .flat_map(|(i, layer)| layer.iter().map(move |id| (id.clone(), i)))
        .collect()
}

proptest! {
    #[test]
    fn every_object_lands_after_its_dependencies(graph in acyclic_graph_strategy(12)) {
        let layers = layers(&graph).unwrap();
        let index = layer_index(&layers);

        prop_assert_eq!(index.len(), graph.len());
        prop_assert!(layers.iter().all(|layer| !layer.is_empty()));
        for id in graph.ids() {
            for dep in graph.dependencies_of(id) {
                prop_assert!(index[dep] < index[id], "{} not after {}", id, dep);
            }
        }
    }

    #[test]
    fn removal_order_is_the_mirror_of_apply_order(graph in acyclic_graph_strategy(12)) {
        let forward = layers(&graph).unwrap();
        let mut backward = reverse_layers(&graph).unwrap();
        backward.reverse();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn builder_names_and_waits_follow_the_layers(
        graph in acyclic_graph_strategy(12),
        timeout in proptest::option::of(1u64..1000),
        dry_run in any::<bool>(),
    ) {
        let layers = reverse_layers(&graph).unwrap();
        let layer_count = layers.len();
        let mut builder = TaskQueueBuilder::new(dry_run);
        builder.delete_layers(layers, timeout.map(Duration::from_millis));
        let groups = action_groups(&builder.build());

        let deletes: Vec<&str> = groups
            .iter()
            .filter(|g| g.action == ActionKind::Delete)
            .map(|g| g.name.as_str())
            .collect();
        let expected: Vec<String> = (0..layer_count).map(|i| format!("delete-{i}")).collect();
        prop_assert_eq!(deletes, expected.iter().map(String::as_str).collect::<Vec<_>>());

        let waits = groups.iter().filter(|g| g.action == ActionKind::Wait).count();
        let expected_waits = match (dry_run, timeout) {
            (true, _) => 0,
            (false, Some(_)) => layer_count,
            (false, None) => layer_count - 1,
        };
        prop_assert_eq!(waits, expected_waits);

        // A wait always follows the delete it watches.
        for pair in groups.windows(2) {
            if pair[1].action == ActionKind::Wait {
                prop_assert_eq!(pair[0].action, ActionKind::Delete);
                prop_assert_eq!(&pair[0].identifiers, &pair[1].identifiers);
            }
        }
    }
}
