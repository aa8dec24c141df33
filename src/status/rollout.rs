// src/status/rollout.rs

//! Status rule for `argoproj.io/Rollout`.
//!
//! Registered through the same [`StatusRuleRegistry::register`] call any
//! extension would use.
//!
//! [`StatusRuleRegistry::register`]: crate::status::StatusRuleRegistry::register

use crate::errors::Result;
use crate::object::Unstructured;
use crate::status::{ConditionStatus, StatusResult, conditions_of};

const ROLLOUT_COMPLETED: &str = "Rollout completed";

pub fn rollout(obj: &Unstructured) -> Result<StatusResult> {
    let mut completed = false;
    let mut healthy = false;
    let mut paused = false;
    let mut progressing = true;
    let mut progressing_message = String::new();

    for condition in conditions_of(obj) {
        match condition.type_.as_str() {
            "Completed" => completed = condition.is_true(),
            "Healthy" => healthy = condition.is_true(),
            "Paused" => paused = condition.is_true(),
            "Progressing" => match condition.status {
                ConditionStatus::True => {
                    progressing = true;
                    progressing_message = condition.message;
                }
                ConditionStatus::Unknown => progressing = false,
                // Only a deadline stops progress; other False reasons leave the flag as is.
                ConditionStatus::False => {
                    if condition.reason == "ProgressDeadlineExceeded" {
                        progressing = false;
                    }
                }
            },
            _ => {}
        }
    }

    let result = if progressing {
        if !completed {
            StatusResult::in_progress("", progressing_message)
        } else if healthy {
            StatusResult::current(ROLLOUT_COMPLETED)
        } else {
            StatusResult::failed("", progressing_message)
        }
    } else if completed && healthy {
        StatusResult::current(ROLLOUT_COMPLETED)
    } else if paused {
        StatusResult::in_progress("", progressing_message)
    } else {
        StatusResult::failed("", progressing_message)
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use serde_json::{Value, json};

    fn rollout_with(conditions: Value) -> Unstructured {
        Unstructured::from_value(json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Rollout",
            "metadata": { "name": "demo", "namespace": "default" },
            "status": { "conditions": conditions }
        }))
        .unwrap()
    }

    #[test]
    fn completed_and_healthy_is_current() {
        let obj = rollout_with(json!([
            { "type": "Completed", "status": "True" },
            { "type": "Healthy", "status": "True" },
            { "type": "Progressing", "status": "True", "message": "done" }
        ]));
        let result = rollout(&obj).unwrap();
        assert_eq!(result.status, Status::Current);
        assert_eq!(result.message, "Rollout completed");
    }

    #[test]
    fn paused_without_progress_is_in_progress() {
        let obj = rollout_with(json!([
            { "type": "Paused", "status": "True" },
            { "type": "Progressing", "status": "Unknown" }
        ]));
        assert_eq!(rollout(&obj).unwrap().status, Status::InProgress);
    }

    #[test]
    fn other_false_reasons_keep_progressing() {
        let obj = rollout_with(json!([
            { "type": "Progressing", "status": "False", "reason": "RolloutAborted" }
        ]));
        assert_eq!(rollout(&obj).unwrap().status, Status::InProgress);
    }

    #[test]
    fn completed_but_unhealthy_while_progressing_is_failed() {
        let obj = rollout_with(json!([
            { "type": "Completed", "status": "True" },
            { "type": "Healthy", "status": "False" }
        ]));
        assert_eq!(rollout(&obj).unwrap().status, Status::Failed);
    }
}
