use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How mutations are sent to the cluster.
///
/// - `None`: real mutations.
/// - `Client`: nothing is sent; tasks report what would happen.
/// - `Server`: mutations are sent with the server-side dry-run flag.
///
/// Inventory writes are skipped and no wait tasks are planned for either
/// dry-run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DryRunStrategy {
    #[default]
    None,
    Client,
    Server,
}

impl DryRunStrategy {
    pub fn is_dry_run(self) -> bool {
        !matches!(self, DryRunStrategy::None)
    }
}

impl FromStr for DryRunStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(DryRunStrategy::None),
            "client" => Ok(DryRunStrategy::Client),
            "server" => Ok(DryRunStrategy::Server),
            other => Err(format!(
                "invalid dry_run: {other} (expected \"none\", \"client\" or \"server\")"
            )),
        }
    }
}

/// What the runner does when a wait task times out.
///
/// - `Continue` (default): record the timeout, skip dependents of the
///   timed-out resources, keep running later stages.
/// - `Abort`: treat the timeout like a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitTimeoutBehaviour {
    #[default]
    Continue,
    Abort,
}

impl FromStr for WaitTimeoutBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(WaitTimeoutBehaviour::Continue),
            "abort" => Ok(WaitTimeoutBehaviour::Abort),
            other => Err(format!(
                "invalid wait_timeout_behaviour: {other} (expected \"continue\" or \"abort\")"
            )),
        }
    }
}

/// How the status poller reads objects each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStrategy {
    /// One `get` per identifier.
    Individual,
    /// One `list` per (group, kind, namespace).
    #[default]
    Batched,
}

impl FromStr for ReadStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "individual" => Ok(ReadStrategy::Individual),
            "batched" => Ok(ReadStrategy::Batched),
            other => Err(format!(
                "invalid read_strategy: {other} (expected \"individual\" or \"batched\")"
            )),
        }
    }
}

/// Which errors make a run count as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorAggregation {
    /// Only fatal errors (inventory I/O, cancellation) fail the run.
    #[default]
    FatalOnly,
    /// Any per-resource failure or skip-with-error fails the run.
    AnyError,
}

impl FromStr for ErrorAggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fatal-only" => Ok(ErrorAggregation::FatalOnly),
            "any-error" => Ok(ErrorAggregation::AnyError),
            other => Err(format!(
                "invalid error_aggregation: {other} (expected \"fatal-only\" or \"any-error\")"
            )),
        }
    }
}
