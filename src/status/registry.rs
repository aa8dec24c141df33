// src/status/registry.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::object::GroupKind;
use crate::object::Unstructured;
use crate::status::{StatusResult, rollout, rules};

/// Kind-specific status rule.
///
/// Runs after the generic checks (deletion, observed generation, computed
/// conditions) have passed. Any `Fn(&Unstructured) -> Result<StatusResult>`
/// is a rule.
pub trait StatusRule: Send + Sync {
    fn compute(&self, obj: &Unstructured) -> Result<StatusResult>;
}

impl<F> StatusRule for F
where
    F: Fn(&Unstructured) -> Result<StatusResult> + Send + Sync,
{
    fn compute(&self, obj: &Unstructured) -> Result<StatusResult> {
        self(obj)
    }
}

/// Rules keyed by `group/kind` (bare kind for the core group).
#[derive(Clone, Default)]
pub struct StatusRuleRegistry {
    rules: HashMap<String, Arc<dyn StatusRule>>,
}

impl fmt::Debug for StatusRuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.rules.keys().collect();
        keys.sort();
        f.debug_struct("StatusRuleRegistry")
            .field("rules", &keys)
            .finish()
    }
}

impl StatusRuleRegistry {
    /// Empty registry: every kind uses the generic fallback.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_rules() -> Self {
        let mut registry = Self::new();
        registry.register("apps", "Deployment", rules::deployment);
        registry.register("apps", "StatefulSet", rules::stateful_set);
        registry.register("apps", "DaemonSet", rules::daemon_set);
        registry.register("apps", "ReplicaSet", rules::replica_set);
        registry.register("", "Pod", rules::pod);
        registry.register("", "PersistentVolumeClaim", rules::pvc);
        registry.register("", "Service", rules::service);
        registry.register("batch", "Job", rules::job);
        registry.register("policy", "PodDisruptionBudget", rules::pdb);
        registry.register(
            "apiextensions.k8s.io",
            "CustomResourceDefinition",
            rules::crd,
        );
        registry.register("argoproj.io", "Rollout", rollout::rollout);
        registry
    }

    /// Register (or replace) the rule for `group`/`kind`.
    pub fn register(&mut self, group: &str, kind: &str, rule: impl StatusRule + 'static) {
        let key = GroupKind::new(group, kind).rule_key();
        self.rules.insert(key, Arc::new(rule));
    }

    pub fn resolve(&self, group_kind: &GroupKind) -> Option<Arc<dyn StatusRule>> {
        self.rules.get(&group_kind.rule_key()).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
