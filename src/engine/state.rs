// src/engine/state.rs

//! Per-run task state.

use std::collections::HashMap;

use tracing::debug;

/// Lifecycle of one planned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    /// Never started because an earlier stage aborted the run.
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Skipped)
    }
}

/// Tracks [`TaskState`] for every task in a plan, in plan order.
#[derive(Debug, Default)]
pub struct PlanState {
    order: Vec<String>,
    states: HashMap<String, TaskState>,
}

impl PlanState {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut plan = Self::default();
        for name in names {
            if plan.states.insert(name.to_string(), TaskState::Pending).is_none() {
                plan.order.push(name.to_string());
            }
        }
        plan
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.states.get(name).copied()
    }

    pub fn start(&mut self, name: &str) {
        self.transition(name, TaskState::Running);
    }

    pub fn complete(&mut self, name: &str) {
        self.transition(name, TaskState::Completed);
    }

    pub fn fail(&mut self, name: &str) {
        self.transition(name, TaskState::Failed);
    }

    /// Mark every task that has not started yet as skipped; returns their
    /// names in plan order.
    pub fn skip_pending(&mut self) -> Vec<String> {
        let mut skipped = Vec::new();
        for name in &self.order {
            if let Some(state) = self.states.get_mut(name)
                && *state == TaskState::Pending
            {
                *state = TaskState::Skipped;
                skipped.push(name.clone());
            }
        }
        if !skipped.is_empty() {
            debug!(count = skipped.len(), "remaining tasks skipped");
        }
        skipped
    }

    pub fn all_terminal(&self) -> bool {
        self.states.values().all(|s| s.is_terminal())
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    fn transition(&mut self, name: &str, to: TaskState) {
        match self.states.get_mut(name) {
            Some(state) if state.is_terminal() => {
                debug!(task = %name, from = ?state, to = ?to, "ignoring transition out of terminal state");
            }
            Some(state) => {
                debug!(task = %name, from = ?state, to = ?to, "task state");
                *state = to;
            }
            None => debug!(task = %name, "unknown task"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_pending_leaves_finished_tasks_alone() {
        let mut plan = PlanState::new(["inventory-add-0", "apply-0", "inventory-set-0"]);
        plan.start("inventory-add-0");
        plan.fail("inventory-add-0");

        assert_eq!(plan.skip_pending(), vec!["apply-0", "inventory-set-0"]);
        assert_eq!(plan.state("inventory-add-0"), Some(TaskState::Failed));
        assert!(plan.all_terminal());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut plan = PlanState::new(["wait-0"]);
        plan.start("wait-0");
        plan.complete("wait-0");
        plan.fail("wait-0");
        assert_eq!(plan.state("wait-0"), Some(TaskState::Completed));
        assert_eq!(plan.count(TaskState::Completed), 1);
    }
}
