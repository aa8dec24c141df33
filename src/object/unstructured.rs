// src/object/unstructured.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{KapplyError, Result};
use crate::object::{GroupKind, ObjMetadata};

/// A resource as an untyped JSON object.
///
/// The engine never needs typed structs for the resources it manages; rules
/// and tasks read the few fields they care about through the helpers here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unstructured {
    object: Map<String, Value>,
}

impl Unstructured {
    /// Wrap a JSON value; anything other than an object is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(Self { object }),
            other => Err(KapplyError::InvalidObject(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.object)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.object
    }

    pub fn api_version(&self) -> &str {
        self.nested_str(&["apiVersion"]).unwrap_or_default()
    }

    /// API group: the part of `apiVersion` before `/`, empty for the core group.
    pub fn group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((group, _version)) => group,
            None => "",
        }
    }

    pub fn kind(&self) -> &str {
        self.nested_str(&["kind"]).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.nested_str(&["metadata", "name"]).unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.nested_str(&["metadata", "namespace"])
            .unwrap_or_default()
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group(), self.kind())
    }

    /// Identifier of this object; kind and name are required.
    pub fn id(&self) -> Result<ObjMetadata> {
        if self.kind().is_empty() {
            return Err(KapplyError::InvalidObject(
                "object is missing `kind`".to_string(),
            ));
        }
        if self.name().is_empty() {
            return Err(KapplyError::InvalidObject(format!(
                "{} object is missing `metadata.name`",
                self.kind()
            )));
        }
        Ok(ObjMetadata::new(
            self.group(),
            self.kind(),
            self.namespace(),
            self.name(),
        ))
    }

    pub fn generation(&self) -> Result<Option<i64>> {
        self.nested_i64(&["metadata", "generation"])
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.nested_str(&["metadata", "resourceVersion"])
    }

    pub fn deletion_timestamp(&self) -> Option<&str> {
        self.nested_str(&["metadata", "deletionTimestamp"])
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.field(&["metadata", "annotations"])
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.field(&["metadata", "annotations", key])
            .and_then(Value::as_str)
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        self.set_field(
            &["metadata", "annotations", key],
            Value::String(value.to_string()),
        );
    }

    /// Look up a nested field by path.
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.object.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    /// Set a nested field, creating intermediate objects as needed.
    ///
    /// Intermediate values that are not objects are replaced.
    pub fn set_field(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };

        let mut current = &mut self.object;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value);
    }

    pub fn remove_field(&mut self, path: &[&str]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.object;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.remove(*last)
    }

    pub fn nested_str(&self, path: &[&str]) -> Option<&str> {
        self.field(path).and_then(Value::as_str)
    }

    /// Integer field; a present value that is not an integer is an error.
    pub fn nested_i64(&self, path: &[&str]) -> Result<Option<i64>> {
        match self.field(path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| KapplyError::InvalidField {
                    path: path.join("."),
                    message: format!("expected an integer, got {n}"),
                }),
            Some(other) => Err(KapplyError::InvalidField {
                path: path.join("."),
                message: format!("expected an integer, got {}", type_name(other)),
            }),
        }
    }

    pub fn nested_slice(&self, path: &[&str]) -> Option<&Vec<Value>> {
        self.field(path).and_then(Value::as_array)
    }
}

impl TryFrom<Value> for Unstructured {
    type Error = KapplyError;

    fn try_from(value: Value) -> Result<Self> {
        Unstructured::from_value(value)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> Unstructured {
        Unstructured::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "web",
                "namespace": "prod",
                "generation": 3,
                "annotations": { "team": "core" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn identifier_uses_group_from_api_version() {
        let obj = deployment();
        assert_eq!(
            obj.id().unwrap(),
            ObjMetadata::new("apps", "Deployment", "prod", "web")
        );

        let core = Unstructured::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cfg" }
        }))
        .unwrap();
        assert_eq!(core.group(), "");
        assert!(!core.id().unwrap().is_namespaced());
    }

    #[test]
    fn missing_name_is_invalid() {
        let obj = Unstructured::from_value(json!({ "apiVersion": "v1", "kind": "Pod" })).unwrap();
        assert!(matches!(obj.id(), Err(KapplyError::InvalidObject(_))));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(Unstructured::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn set_annotation_creates_intermediate_maps() {
        let mut obj = Unstructured::from_value(json!({ "kind": "Pod" })).unwrap();
        obj.set_annotation("owner", "inv-1");
        assert_eq!(obj.annotation("owner"), Some("inv-1"));

        let mut dep = deployment();
        dep.set_annotation("owner", "inv-2");
        assert_eq!(dep.annotations().len(), 2);
    }

    #[test]
    fn nested_i64_rejects_strings() {
        let obj = deployment();
        assert_eq!(obj.generation().unwrap(), Some(3));

        let mut bad = deployment();
        bad.set_field(&["metadata", "generation"], json!("three"));
        assert!(matches!(
            bad.generation(),
            Err(KapplyError::InvalidField { .. })
        ));
    }
}
