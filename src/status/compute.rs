// src/status/compute.rs

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::errors::{KapplyError, Result};
use crate::object::Unstructured;
use crate::status::{
    CONDITION_RECONCILING, CONDITION_STALLED, StatusResult, StatusRuleRegistry, conditions_of,
    find_condition,
};

/// Evaluates objects against the generic checks and the registered rules.
#[derive(Debug, Clone)]
pub struct StatusComputer {
    registry: Arc<StatusRuleRegistry>,
}

impl Default for StatusComputer {
    fn default() -> Self {
        Self::new(Arc::new(StatusRuleRegistry::with_builtin_rules()))
    }
}

impl StatusComputer {
    pub fn new(registry: Arc<StatusRuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StatusRuleRegistry {
        &self.registry
    }

    /// Verdict for one live object.
    ///
    /// Order: deletion, observed generation, computed conditions, then the
    /// kind rule or the generic fallback. A malformed field is an error for
    /// this object only.
    pub fn compute(&self, obj: &Unstructured) -> Result<StatusResult> {
        if let Some(result) = generic_checks(obj)? {
            return Ok(result);
        }

        let group_kind = obj.group_kind();
        match self.registry.resolve(&group_kind) {
            Some(rule) => {
                trace!(kind = %group_kind, "using registered status rule");
                rule.compute(obj)
            }
            None => fallback(obj),
        }
    }

    /// Write the computed `Reconciling`/`Stalled` conditions into
    /// `status.conditions`, replacing entries of the same type.
    pub fn augment(&self, obj: &mut Unstructured) -> Result<()> {
        let result = self.compute(obj)?;
        if result.conditions.is_empty() {
            return Ok(());
        }

        let mut conditions: Vec<Value> = obj
            .nested_slice(&["status", "conditions"])
            .cloned()
            .unwrap_or_default();

        for computed in &result.conditions {
            let value = serde_json::to_value(computed).map_err(anyhow::Error::from)?;
            let existing = conditions.iter_mut().find(|c| {
                c.get("type").and_then(Value::as_str) == Some(computed.type_.as_str())
            });
            match existing {
                Some(slot) => *slot = value,
                None => conditions.push(value),
            }
        }

        obj.set_field(&["status", "conditions"], Value::Array(conditions));
        Ok(())
    }
}

/// `status.observedGeneration`, accepting integers and numeric strings.
pub fn observed_generation(obj: &Unstructured) -> Result<Option<i64>> {
    const PATH: &str = "status.observedGeneration";

    match obj.field(&["status", "observedGeneration"]) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
            KapplyError::InvalidField {
                path: PATH.to_string(),
                message: format!("expected a number, got \"{raw}\""),
            }
        }),
        Some(_) => obj.nested_i64(&["status", "observedGeneration"]),
    }
}

fn generic_checks(obj: &Unstructured) -> Result<Option<StatusResult>> {
    if obj.deletion_timestamp().is_some() {
        return Ok(Some(StatusResult::terminating(
            "Resource scheduled for deletion",
        )));
    }

    if let (Some(generation), Some(observed)) = (obj.generation()?, observed_generation(obj)?)
        && generation != observed
    {
        return Ok(Some(StatusResult::in_progress(
            "LatestGenerationNotObserved",
            format!(
                "not yet observed latest generation (generation {generation}, observed {observed})"
            ),
        )));
    }

    let conditions = conditions_of(obj);
    if let Some(c) = find_condition(&conditions, CONDITION_RECONCILING)
        && c.is_true()
    {
        return Ok(Some(StatusResult::in_progress(&c.reason, &c.message)));
    }
    if let Some(c) = find_condition(&conditions, CONDITION_STALLED)
        && c.is_true()
    {
        return Ok(Some(StatusResult::failed(&c.reason, &c.message)));
    }

    Ok(None)
}

/// Rule for kinds without a registered one.
fn fallback(obj: &Unstructured) -> Result<StatusResult> {
    let conditions = conditions_of(obj);
    if let Some(ready) = find_condition(&conditions, "Ready")
        && ready.status == crate::status::ConditionStatus::False
    {
        let message = if ready.message.is_empty() {
            "Resource is not Ready".to_string()
        } else {
            ready.message.clone()
        };
        return Ok(StatusResult::in_progress("NotReady", message));
    }

    let desired = obj.nested_i64(&["spec", "replicas"])?;
    let ready = obj.nested_i64(&["status", "readyReplicas"])?;
    if let Some(desired) = desired {
        let ready = ready.unwrap_or(0);
        if ready < desired {
            return Ok(StatusResult::in_progress(
                "LessReady",
                format!("Ready: {ready}/{desired}"),
            ));
        }
    }

    Ok(StatusResult::current("Resource is current"))
}
