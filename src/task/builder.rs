// src/task/builder.rs

//! Assemble tasks into the ordered stages of a run.
//!
//! Names are stable and numbered per kind: `apply-0`, `apply-1`, ...;
//! `prune-0`, ...; `delete-0`, ...; and `wait-0`, `wait-1`, ... counted
//! across the whole plan.

use std::time::Duration;

use tracing::debug;

use crate::event::ActionGroup;
use crate::object::{ObjMetadata, ObjMetadataSet, Unstructured};
use crate::task::{
    ApplyTask, InventoryAddTask, InventoryDeleteOrUpdateTask, InventorySetTask, RemovalKind,
    RemoveTask, Task, WaitCondition, WaitTask,
};

/// Tasks that run concurrently. Stages run one after another.
#[derive(Debug, Clone)]
pub struct Stage {
    pub tasks: Vec<Task>,
}

impl Stage {
    pub fn single(task: Task) -> Self {
        Self { tasks: vec![task] }
    }
}

#[derive(Debug, Default)]
pub struct TaskQueueBuilder {
    stages: Vec<Stage>,
    /// No wait tasks are planned when set.
    dry_run: bool,
    apply_count: usize,
    prune_count: usize,
    delete_count: usize,
    wait_count: usize,
}

impl TaskQueueBuilder {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn inventory_add(&mut self, previous: ObjMetadataSet, desired: ObjMetadataSet) -> &mut Self {
        self.push(Task::InventoryAdd(InventoryAddTask { previous, desired }))
    }

    /// One apply task per layer. A layer is followed by a wait when a later
    /// layer exists or `timeout` is set.
    pub fn apply_layers(
        &mut self,
        layers: Vec<Vec<(ObjMetadata, Unstructured)>>,
        timeout: Option<Duration>,
    ) -> &mut Self {
        let count = layers.len();
        for (i, objects) in layers.into_iter().enumerate() {
            if objects.is_empty() {
                continue;
            }
            let ids: Vec<ObjMetadata> = objects.iter().map(|(id, _)| id.clone()).collect();
            let name = format!("apply-{}", self.apply_count);
            self.apply_count += 1;
            self.push(Task::Apply(ApplyTask { name, objects }));
            self.maybe_wait(ids, WaitCondition::Current, timeout, i + 1 < count);
        }
        self
    }

    pub fn prune_layers(&mut self, layers: Vec<Vec<ObjMetadata>>, timeout: Option<Duration>) -> &mut Self {
        self.removal_layers(RemovalKind::Prune, layers, timeout)
    }

    pub fn delete_layers(&mut self, layers: Vec<Vec<ObjMetadata>>, timeout: Option<Duration>) -> &mut Self {
        self.removal_layers(RemovalKind::Delete, layers, timeout)
    }

    fn removal_layers(
        &mut self,
        kind: RemovalKind,
        layers: Vec<Vec<ObjMetadata>>,
        timeout: Option<Duration>,
    ) -> &mut Self {
        let count = layers.len();
        for (i, ids) in layers.into_iter().enumerate() {
            if ids.is_empty() {
                continue;
            }
            let name = match kind {
                RemovalKind::Prune => {
                    self.prune_count += 1;
                    format!("prune-{}", self.prune_count - 1)
                }
                RemovalKind::Delete => {
                    self.delete_count += 1;
                    format!("delete-{}", self.delete_count - 1)
                }
            };
            self.push(Task::Remove(RemoveTask {
                name,
                kind,
                ids: ids.clone(),
            }));
            self.maybe_wait(ids, WaitCondition::NotFound, timeout, i + 1 < count);
        }
        self
    }

    pub fn inventory_set(
        &mut self,
        previous: ObjMetadataSet,
        desired: ObjMetadataSet,
        prune_candidates: ObjMetadataSet,
    ) -> &mut Self {
        self.push(Task::InventorySet(InventorySetTask {
            previous,
            desired,
            prune_candidates,
        }))
    }

    pub fn inventory_delete_or_update(&mut self, members: ObjMetadataSet) -> &mut Self {
        self.push(Task::InventoryDeleteOrUpdate(InventoryDeleteOrUpdateTask { members }))
    }

    pub fn build(&mut self) -> Vec<Stage> {
        let stages = std::mem::take(&mut self.stages);
        debug!(stages = stages.len(), "task queue built");
        stages
    }

    fn maybe_wait(
        &mut self,
        ids: Vec<ObjMetadata>,
        condition: WaitCondition,
        timeout: Option<Duration>,
        later_layer: bool,
    ) {
        if self.dry_run || !(later_layer || timeout.is_some()) {
            return;
        }
        let name = format!("wait-{}", self.wait_count);
        self.wait_count += 1;
        self.push(Task::Wait(WaitTask {
            name,
            ids,
            condition,
            timeout,
        }));
    }

    fn push(&mut self, task: Task) -> &mut Self {
        self.stages.push(Stage::single(task));
        self
    }
}

/// Plan summary for the `Init` event.
pub fn action_groups(stages: &[Stage]) -> Vec<ActionGroup> {
    stages
        .iter()
        .flat_map(|stage| stage.tasks.iter())
        .map(|task| ActionGroup {
            name: task.name().to_string(),
            action: task.action(),
            identifiers: task.identifiers(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ActionKind;
    use serde_json::json;

    fn cm(name: &str) -> (ObjMetadata, Unstructured) {
        let obj = Unstructured::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": name, "namespace": "default" }
        }))
        .unwrap();
        (obj.id().unwrap(), obj)
    }

    fn names(stages: &[Stage]) -> Vec<String> {
        action_groups(stages).into_iter().map(|g| g.name).collect()
    }

    #[test]
    fn waits_between_layers_only_without_timeout() {
        let stages = TaskQueueBuilder::new(false)
            .inventory_add(ObjMetadataSet::new(), ObjMetadataSet::new())
            .apply_layers(vec![vec![cm("a")], vec![cm("b")]], None)
            .inventory_set(ObjMetadataSet::new(), ObjMetadataSet::new(), ObjMetadataSet::new())
            .build();

        assert_eq!(
            names(&stages),
            vec!["inventory-add-0", "apply-0", "wait-0", "apply-1", "inventory-set-0"]
        );
    }

    #[test]
    fn timeout_adds_trailing_wait_and_numbers_waits_globally() {
        let prune = vec![vec![cm("old").0]];
        let stages = TaskQueueBuilder::new(false)
            .apply_layers(vec![vec![cm("a")]], Some(Duration::from_secs(5)))
            .prune_layers(prune, Some(Duration::from_secs(5)))
            .build();

        let groups = action_groups(&stages);
        let got: Vec<(&str, ActionKind)> = groups.iter().map(|g| (g.name.as_str(), g.action)).collect();
        assert_eq!(
            got,
            vec![
                ("apply-0", ActionKind::Apply),
                ("wait-0", ActionKind::Wait),
                ("prune-0", ActionKind::Prune),
                ("wait-1", ActionKind::Wait),
            ]
        );
    }

    #[test]
    fn dry_run_plans_no_waits() {
        let stages = TaskQueueBuilder::new(true)
            .delete_layers(vec![vec![cm("b").0], vec![cm("a").0]], Some(Duration::from_secs(1)))
            .inventory_delete_or_update(ObjMetadataSet::new())
            .build();

        assert_eq!(
            names(&stages),
            vec!["delete-0", "delete-1", "inventory-delete-or-update-0"]
        );
    }

    #[test]
    fn empty_layers_are_skipped() {
        let stages = TaskQueueBuilder::new(false)
            .apply_layers(vec![], None)
            .prune_layers(vec![vec![]], None)
            .build();
        assert!(stages.is_empty());
    }
}
