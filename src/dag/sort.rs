// src/dag/sort.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::DependencyGraph;
use crate::errors::{KapplyError, Result};
use crate::object::ObjMetadata;

/// Split the graph into apply layers.
///
/// Layer 0 holds objects with no dependencies inside the set; every object
/// sits one layer after its deepest dependency. Within a layer objects are
/// ordered by kind, then namespace, then name.
pub fn layers(graph: &DependencyGraph) -> Result<Vec<Vec<ObjMetadata>>> {
    // Edge direction: dependency -> dependent.
    let mut dag: DiGraphMap<&ObjMetadata, ()> = DiGraphMap::new();
    for id in graph.ids() {
        dag.add_node(id);
    }
    for id in graph.ids() {
        for dep in graph.dependencies_of(id) {
            dag.add_edge(dep, id, ());
        }
    }

    let order = toposort(&dag, None)
        .map_err(|cycle| KapplyError::DependencyCycle(cycle.node_id().clone()))?;

    let mut depth: HashMap<&ObjMetadata, usize> = HashMap::with_capacity(order.len());
    for id in &order {
        let d = graph
            .dependencies_of(id)
            .iter()
            .filter_map(|dep| depth.get(dep))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(*id, d);
    }

    let count = depth.values().copied().max().map_or(0, |d| d + 1);
    let mut out: Vec<Vec<ObjMetadata>> = vec![Vec::new(); count];
    for (id, d) in depth {
        out[d].push(id.clone());
    }
    for layer in &mut out {
        layer.sort_by(|a, b| {
            (&a.kind, &a.namespace, &a.name, &a.group).cmp(&(&b.kind, &b.namespace, &b.name, &b.group))
        });
    }
    Ok(out)
}

/// Layers for deletion: dependents go before what they depend on.
pub fn reverse_layers(graph: &DependencyGraph) -> Result<Vec<Vec<ObjMetadata>>> {
    let mut out = layers(graph)?;
    out.reverse();
    Ok(out)
}
