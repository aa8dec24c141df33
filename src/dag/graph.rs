// src/dag/graph.rs

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::errors::Result;
use crate::object::{GroupKind, ObjMetadata, Unstructured, dependencies_of};

const NAMESPACE_KIND: &str = "Namespace";
const CRD_GROUP: &str = "apiextensions.k8s.io";
const CRD_KIND: &str = "CustomResourceDefinition";

/// Immediate dependencies and dependents of one object.
#[derive(Debug, Clone, Default)]
struct DepNode {
    deps: Vec<ObjMetadata>,
    dependents: Vec<ObjMetadata>,
}

/// Dependency graph over a set of objects.
///
/// An edge `a -> b` means `a` depends on `b`: `b` is applied first and
/// deleted last. Edges only connect objects inside the set; references to
/// anything else are dropped. The graph may contain cycles; layering
/// rejects them.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<ObjMetadata, DepNode>,
    /// Insertion order, for deterministic iteration.
    order: Vec<ObjMetadata>,
}

impl DependencyGraph {
    /// Build the graph from explicit `depends-on` annotations plus the
    /// implicit edges (namespace before its contents, CRD before its custom
    /// resources).
    pub fn from_objects(objects: &[Unstructured]) -> Result<Self> {
        let mut graph = Self::default();
        for obj in objects {
            graph.add_node(obj.id()?);
        }

        // CRD-defined (group, kind) -> CRD id
        let mut crds: HashMap<GroupKind, ObjMetadata> = HashMap::new();
        for obj in objects {
            if obj.group() == CRD_GROUP && obj.kind() == CRD_KIND {
                let group = obj.nested_str(&["spec", "group"]).unwrap_or_default();
                let kind = obj.nested_str(&["spec", "names", "kind"]).unwrap_or_default();
                if !kind.is_empty() {
                    crds.insert(GroupKind::new(group, kind), obj.id()?);
                }
            }
        }

        for obj in objects {
            let id = obj.id()?;

            for dep in dependencies_of(obj)? {
                graph.add_edge(&id, dep);
            }

            if !id.namespace.is_empty() {
                let ns = ObjMetadata::new("", NAMESPACE_KIND, "", id.namespace.clone());
                graph.add_edge(&id, ns);
            }

            if let Some(crd) = crds.get(&id.group_kind()) {
                graph.add_edge(&id, crd.clone());
            }
        }

        debug!(objects = graph.len(), "built dependency graph");
        Ok(graph)
    }

    /// Build a graph from identifiers and `(dependent, dependency)` pairs.
    pub fn from_edges(
        ids: impl IntoIterator<Item = ObjMetadata>,
        edges: impl IntoIterator<Item = (ObjMetadata, ObjMetadata)>,
    ) -> Self {
        let mut graph = Self::default();
        for id in ids {
            graph.add_node(id);
        }
        for (dependent, dependency) in edges {
            graph.add_edge(&dependent, dependency);
        }
        graph
    }

    /// Add identifiers without edges, e.g. objects that could not be read.
    pub fn extend_ids(&mut self, ids: impl IntoIterator<Item = ObjMetadata>) {
        for id in ids {
            self.add_node(id);
        }
    }

    fn add_node(&mut self, id: ObjMetadata) {
        if !self.nodes.contains_key(&id) {
            self.nodes.insert(id.clone(), DepNode::default());
            self.order.push(id);
        }
    }

    fn add_edge(&mut self, dependent: &ObjMetadata, dependency: ObjMetadata) {
        if dependent == &dependency || !self.nodes.contains_key(&dependency) {
            trace!(id = %dependent, dependency = %dependency, "ignoring edge outside the set");
            return;
        }
        let Some(node) = self.nodes.get_mut(dependent) else {
            return;
        };
        if node.deps.contains(&dependency) {
            return;
        }
        node.deps.push(dependency.clone());
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.dependents.push(dependent.clone());
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjMetadata> {
        self.order.iter()
    }

    pub fn contains(&self, id: &ObjMetadata) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Objects `id` depends on.
    pub fn dependencies_of(&self, id: &ObjMetadata) -> &[ObjMetadata] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Objects that depend on `id`.
    pub fn dependents_of(&self, id: &ObjMetadata) -> &[ObjMetadata] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DEPENDS_ON_ANNOTATION;
    use serde_json::json;

    fn cm(name: &str, ns: &str) -> Unstructured {
        Unstructured::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": name, "namespace": ns }
        }))
        .unwrap()
    }

    #[test]
    fn namespace_is_an_implicit_dependency() {
        let ns = Unstructured::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": "app" }
        }))
        .unwrap();
        let objects = vec![cm("cfg", "app"), ns.clone()];
        let graph = DependencyGraph::from_objects(&objects).unwrap();

        let cfg = objects[0].id().unwrap();
        assert_eq!(graph.dependencies_of(&cfg), &[ns.id().unwrap()]);
        assert_eq!(graph.dependents_of(&ns.id().unwrap()), &[cfg]);
    }

    #[test]
    fn crd_precedes_its_custom_resources() {
        let crd = Unstructured::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": { "name": "widgets.example.com" },
            "spec": { "group": "example.com", "names": { "kind": "Widget" } }
        }))
        .unwrap();
        let widget = Unstructured::from_value(json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": { "name": "w", "namespace": "default" }
        }))
        .unwrap();
        let graph = DependencyGraph::from_objects(&[widget.clone(), crd.clone()]).unwrap();
        assert_eq!(
            graph.dependencies_of(&widget.id().unwrap()),
            &[crd.id().unwrap()]
        );
    }

    #[test]
    fn references_outside_the_set_are_dropped() {
        let mut a = cm("a", "default");
        a.set_annotation(DEPENDS_ON_ANNOTATION, "/namespaces/default/ConfigMap/missing");
        let graph = DependencyGraph::from_objects(&[a.clone()]).unwrap();
        assert!(graph.dependencies_of(&a.id().unwrap()).is_empty());
    }
}
