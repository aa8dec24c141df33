#![allow(dead_code)]

use kapply::inventory::{InventoryInfo, OWNING_INVENTORY_KEY};
use kapply::object::{DEPENDS_ON_ANNOTATION, format_reference};
use kapply::{ObjMetadata, Unstructured};
use serde_json::{Value, json};

/// Inventory used by most tests.
pub fn test_inventory() -> InventoryInfo {
    InventoryInfo::new("inventory", "default", "test-inventory-id")
}

/// Builder for `Unstructured` objects.
pub struct ObjectBuilder {
    value: Value,
}

impl ObjectBuilder {
    pub fn new(api_version: &str, kind: &str, name: &str) -> Self {
        Self {
            value: json!({
                "apiVersion": api_version,
                "kind": kind,
                "metadata": { "name": name }
            }),
        }
    }

    pub fn namespace(mut self, ns: &str) -> Self {
        self.value["metadata"]["namespace"] = json!(ns);
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        let metadata = &mut self.value["metadata"];
        if metadata.get("annotations").is_none() {
            metadata["annotations"] = json!({});
        }
        metadata["annotations"][key] = json!(value);
        self
    }

    pub fn owned_by(self, inv: &InventoryInfo) -> Self {
        self.annotation(OWNING_INVENTORY_KEY, &inv.id)
    }

    pub fn depends_on(self, deps: &[&ObjMetadata]) -> Self {
        let refs: Vec<String> = deps.iter().map(|id| format_reference(id)).collect();
        self.annotation(DEPENDS_ON_ANNOTATION, &refs.join(","))
    }

    pub fn field(mut self, path: &[&str], value: Value) -> Self {
        let mut cursor = &mut self.value;
        for key in path {
            if cursor.get(*key).is_none() {
                cursor[*key] = json!({});
            }
            cursor = &mut cursor[*key];
        }
        *cursor = value;
        self
    }

    pub fn build(self) -> Unstructured {
        Unstructured::from_value(self.value).expect("builder produced an invalid object")
    }
}

pub fn configmap(name: &str, ns: &str) -> Unstructured {
    ObjectBuilder::new("v1", "ConfigMap", name)
        .namespace(ns)
        .field(&["data", "key"], json!(name))
        .build()
}

pub fn namespace(name: &str) -> Unstructured {
    ObjectBuilder::new("v1", "Namespace", name).build()
}

pub fn deployment(name: &str, ns: &str, replicas: i64) -> Unstructured {
    ObjectBuilder::new("apps/v1", "Deployment", name)
        .namespace(ns)
        .field(&["spec", "replicas"], json!(replicas))
        .build()
}

pub fn crd(group: &str, kind: &str, plural: &str) -> Unstructured {
    ObjectBuilder::new(
        "apiextensions.k8s.io/v1",
        "CustomResourceDefinition",
        &format!("{plural}.{group}"),
    )
    .field(&["spec", "group"], json!(group))
    .field(&["spec", "names", "kind"], json!(kind))
    .field(&["spec", "names", "plural"], json!(plural))
    .build()
}

pub fn id_of(obj: &Unstructured) -> ObjMetadata {
    obj.id().expect("object has an id")
}
