// src/object/depends_on.rs

//! The `config.kubernetes.io/depends-on` annotation.
//!
//! Value is a comma-separated list of references:
//! - namespaced: `<group>/namespaces/<namespace>/<kind>/<name>`
//! - cluster-scoped: `<group>/<kind>/<name>`
//!
//! The group is empty for core resources, e.g. `/namespaces/web/ConfigMap/cfg`.

use crate::errors::{KapplyError, Result};
use crate::object::{ObjMetadata, Unstructured};

pub const DEPENDS_ON_ANNOTATION: &str = "config.kubernetes.io/depends-on";

/// Explicit dependencies declared on `obj`. Missing annotation means none.
pub fn dependencies_of(obj: &Unstructured) -> Result<Vec<ObjMetadata>> {
    let Some(raw) = obj.annotation(DEPENDS_ON_ANNOTATION) else {
        return Ok(Vec::new());
    };

    let owner = obj.id()?;
    parse_references(raw).map_err(|message| KapplyError::InvalidAnnotation {
        key: DEPENDS_ON_ANNOTATION.to_string(),
        id: owner,
        message,
    })
}

/// Parse an annotation value into identifiers.
pub fn parse_references(raw: &str) -> std::result::Result<Vec<ObjMetadata>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_reference)
        .collect()
}

fn parse_reference(reference: &str) -> std::result::Result<ObjMetadata, String> {
    let parts: Vec<&str> = reference.split('/').collect();
    match parts.as_slice() {
        [group, "namespaces", namespace, kind, name] => {
            check_non_empty(reference, &[namespace, kind, name])?;
            Ok(ObjMetadata::new(*group, *kind, *namespace, *name))
        }
        [group, kind, name] => {
            check_non_empty(reference, &[kind, name])?;
            Ok(ObjMetadata::new(*group, *kind, "", *name))
        }
        _ => Err(format!(
            "malformed reference '{reference}' (expected <group>/<kind>/<name> or <group>/namespaces/<namespace>/<kind>/<name>)"
        )),
    }
}

fn check_non_empty(reference: &str, fields: &[&&str]) -> std::result::Result<(), String> {
    if fields.iter().any(|f| f.is_empty()) {
        return Err(format!("reference '{reference}' has an empty segment"));
    }
    Ok(())
}

/// Format an identifier the way the annotation expects it.
pub fn format_reference(id: &ObjMetadata) -> String {
    if id.namespace.is_empty() {
        format!("{}/{}/{}", id.group, id.kind, id.name)
    } else {
        format!(
            "{}/namespaces/{}/{}/{}",
            id.group, id.namespace, id.kind, id.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_and_cluster_scoped() {
        let refs =
            parse_references("/namespaces/web/ConfigMap/cfg, apiextensions.k8s.io/CustomResourceDefinition/crons.stable.example.com")
                .unwrap();
        assert_eq!(
            refs,
            vec![
                ObjMetadata::new("", "ConfigMap", "web", "cfg"),
                ObjMetadata::new(
                    "apiextensions.k8s.io",
                    "CustomResourceDefinition",
                    "",
                    "crons.stable.example.com"
                ),
            ]
        );
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(parse_references("apps/Deployment").is_err());
        assert!(parse_references("apps/namespaces//Deployment/web").is_err());
    }

    #[test]
    fn format_is_inverse_of_parse() {
        let id = ObjMetadata::new("apps", "Deployment", "web", "frontend");
        let parsed = parse_references(&format_reference(&id)).unwrap();
        assert_eq!(parsed, vec![id]);
    }
}
