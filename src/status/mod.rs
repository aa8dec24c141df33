// src/status/mod.rs

//! Status computation.
//!
//! - [`registry`] maps `group/kind` to a [`registry::StatusRule`].
//! - [`compute`] runs the generic checks, then the rule or the fallback.
//! - [`rules`] holds the built-in rules for core workload kinds.
//! - [`rollout`] is the `argoproj.io/Rollout` extension rule.

pub mod compute;
pub mod registry;
pub mod rollout;
pub mod rules;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::object::Unstructured;

pub use compute::StatusComputer;
pub use registry::{StatusRule, StatusRuleRegistry};

pub const CONDITION_RECONCILING: &str = "Reconciling";
pub const CONDITION_STALLED: &str = "Stalled";

/// Verdict for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    InProgress,
    Failed,
    Current,
    Terminating,
    NotFound,
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::InProgress => "InProgress",
            Status::Failed => "Failed",
            Status::Current => "Current",
            Status::Terminating => "Terminating",
            Status::NotFound => "NotFound",
            Status::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }
}

/// One entry of `status.conditions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Outcome of a status computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResult {
    pub status: Status,
    pub message: String,
    /// Computed conditions (`Reconciling`/`Stalled`) describing the verdict.
    pub conditions: Vec<Condition>,
}

impl StatusResult {
    pub fn current(message: impl Into<String>) -> Self {
        Self {
            status: Status::Current,
            message: message.into(),
            conditions: Vec::new(),
        }
    }

    pub fn in_progress(reason: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: Status::InProgress,
            conditions: vec![Condition::new(
                CONDITION_RECONCILING,
                ConditionStatus::True,
                reason,
                message.clone(),
            )],
            message,
        }
    }

    pub fn failed(reason: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: Status::Failed,
            conditions: vec![Condition::new(
                CONDITION_STALLED,
                ConditionStatus::True,
                reason,
                message.clone(),
            )],
            message,
        }
    }

    pub fn terminating(message: impl Into<String>) -> Self {
        Self {
            status: Status::Terminating,
            message: message.into(),
            conditions: Vec::new(),
        }
    }
}

/// Parse `status.conditions`, skipping entries without a type.
pub fn conditions_of(obj: &Unstructured) -> Vec<Condition> {
    let Some(raw) = obj.nested_slice(&["status", "conditions"]) else {
        return Vec::new();
    };

    raw.iter()
        .filter_map(Value::as_object)
        .filter_map(|c| {
            let type_ = c.get("type")?.as_str()?;
            let text = |key: &str| c.get(key).and_then(Value::as_str).unwrap_or_default();
            Some(Condition::new(
                type_,
                ConditionStatus::parse(text("status")),
                text("reason"),
                text("message"),
            ))
        })
        .collect()
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conditions_parse_leniently() {
        let obj = Unstructured::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "p" },
            "status": { "conditions": [
                { "type": "Ready", "status": "True" },
                { "status": "False" },
                { "type": "Odd", "status": "maybe", "reason": "R" }
            ]}
        }))
        .unwrap();

        let conditions = conditions_of(&obj);
        assert_eq!(conditions.len(), 2);
        assert!(find_condition(&conditions, "Ready").unwrap().is_true());
        let odd = find_condition(&conditions, "Odd").unwrap();
        assert_eq!(odd.status, ConditionStatus::Unknown);
        assert_eq!(odd.reason, "R");
    }

    #[test]
    fn in_progress_carries_reconciling_condition() {
        let result = StatusResult::in_progress("Pending", "waiting");
        assert_eq!(result.status, Status::InProgress);
        assert_eq!(result.conditions[0].type_, CONDITION_RECONCILING);
    }
}
