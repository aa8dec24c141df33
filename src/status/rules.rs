// src/status/rules.rs

//! Built-in rules for core workload kinds.
//!
//! Each rule assumes the generic checks have already passed, so the status
//! block describes the latest generation.

use crate::errors::Result;
use crate::object::Unstructured;
use crate::status::{ConditionStatus, StatusResult, conditions_of, find_condition};

fn int_or(obj: &Unstructured, path: &[&str], default: i64) -> Result<i64> {
    Ok(obj.nested_i64(path)?.unwrap_or(default))
}

fn spec_replicas(obj: &Unstructured) -> Result<i64> {
    int_or(obj, &["spec", "replicas"], 1)
}

pub fn deployment(obj: &Unstructured) -> Result<StatusResult> {
    let conditions = conditions_of(obj);

    if let Some(progressing) = find_condition(&conditions, "Progressing")
        && progressing.status == ConditionStatus::False
        && progressing.reason == "ProgressDeadlineExceeded"
    {
        return Ok(StatusResult::failed(
            "ProgressDeadlineExceeded",
            "Progress deadline exceeded",
        ));
    }

    let spec = spec_replicas(obj)?;
    let replicas = int_or(obj, &["status", "replicas"], 0)?;
    let updated = int_or(obj, &["status", "updatedReplicas"], 0)?;
    let ready = int_or(obj, &["status", "readyReplicas"], 0)?;
    let available = int_or(obj, &["status", "availableReplicas"], 0)?;

    if spec > replicas {
        return Ok(StatusResult::in_progress(
            "LessReplicas",
            format!("Replicas: {replicas}/{spec}"),
        ));
    }
    if spec > updated {
        return Ok(StatusResult::in_progress(
            "LessUpdated",
            format!("Updated: {updated}/{spec}"),
        ));
    }
    if replicas > spec {
        return Ok(StatusResult::in_progress(
            "ExtraPods",
            format!("Pending termination: {}", replicas - spec),
        ));
    }
    if updated > available {
        return Ok(StatusResult::in_progress(
            "LessAvailable",
            format!("Available: {available}/{updated}"),
        ));
    }
    if spec > ready {
        return Ok(StatusResult::in_progress(
            "LessReady",
            format!("Ready: {ready}/{spec}"),
        ));
    }

    if let Some(progressing) = find_condition(&conditions, "Progressing")
        && !(progressing.is_true() && progressing.reason == "NewReplicaSetAvailable")
    {
        return Ok(StatusResult::in_progress(
            "ReplicaSetNotAvailable",
            "Rollout in progress",
        ));
    }
    if let Some(available) = find_condition(&conditions, "Available")
        && !available.is_true()
    {
        return Ok(StatusResult::in_progress(
            "DeploymentNotAvailable",
            "Deployment not available",
        ));
    }

    Ok(StatusResult::current(format!(
        "Deployment is available. Replicas: {replicas}"
    )))
}

pub fn stateful_set(obj: &Unstructured) -> Result<StatusResult> {
    if obj.nested_str(&["spec", "updateStrategy", "type"]) == Some("OnDelete") {
        return Ok(StatusResult::current(
            "StatefulSet is using the ondelete update strategy",
        ));
    }

    let spec = spec_replicas(obj)?;
    let replicas = int_or(obj, &["status", "replicas"], 0)?;
    let ready = int_or(obj, &["status", "readyReplicas"], 0)?;
    let current = int_or(obj, &["status", "currentReplicas"], 0)?;
    let partition = int_or(obj, &["spec", "updateStrategy", "rollingUpdate", "partition"], 0)?;

    if spec > replicas {
        return Ok(StatusResult::in_progress(
            "LessReplicas",
            format!("Replicas: {replicas}/{spec}"),
        ));
    }
    if spec > ready {
        return Ok(StatusResult::in_progress(
            "LessReady",
            format!("Ready: {ready}/{spec}"),
        ));
    }

    if partition > 0 {
        let updated = int_or(obj, &["status", "updatedReplicas"], 0)?;
        let expected = (spec - partition).max(0);
        if updated < expected {
            return Ok(StatusResult::in_progress(
                "PartitionRollout",
                format!("Partitioned roll out in progress. Updated: {updated}/{expected}"),
            ));
        }
        return Ok(StatusResult::current(format!(
            "Partitioned roll out complete. Updated: {updated}/{expected}"
        )));
    }

    if spec > current {
        return Ok(StatusResult::in_progress(
            "LessCurrent",
            format!("Current: {current}/{spec}"),
        ));
    }

    let current_revision = obj.nested_str(&["status", "currentRevision"]);
    let update_revision = obj.nested_str(&["status", "updateRevision"]);
    if let (Some(cur), Some(upd)) = (current_revision, update_revision)
        && cur != upd
    {
        return Ok(StatusResult::in_progress(
            "RevisionMismatch",
            "Waiting for updated revision to match current",
        ));
    }

    Ok(StatusResult::current(format!(
        "All replicas scheduled as expected. Replicas: {replicas}"
    )))
}

pub fn daemon_set(obj: &Unstructured) -> Result<StatusResult> {
    let Some(desired) = obj.nested_i64(&["status", "desiredNumberScheduled"])? else {
        return Ok(StatusResult::in_progress(
            "NoDesiredNumber",
            "Missing .status.desiredNumberScheduled",
        ));
    };
    let current = int_or(obj, &["status", "currentNumberScheduled"], 0)?;
    let updated = int_or(obj, &["status", "updatedNumberScheduled"], 0)?;
    let available = int_or(obj, &["status", "numberAvailable"], 0)?;
    let ready = int_or(obj, &["status", "numberReady"], 0)?;

    let checks = [
        (current, "LessCurrent", "Current"),
        (updated, "LessUpdated", "Updated"),
        (available, "LessAvailable", "Available"),
        (ready, "LessReady", "Ready"),
    ];
    for (have, reason, label) in checks {
        if desired > have {
            return Ok(StatusResult::in_progress(
                reason,
                format!("{label}: {have}/{desired}"),
            ));
        }
    }

    Ok(StatusResult::current(format!(
        "All replicas scheduled as expected. Replicas: {desired}"
    )))
}

pub fn replica_set(obj: &Unstructured) -> Result<StatusResult> {
    let conditions = conditions_of(obj);
    if let Some(failure) = find_condition(&conditions, "ReplicaFailure")
        && failure.is_true()
    {
        return Ok(StatusResult::in_progress(
            "ReplicaFailure",
            "Replica Failure condition. Check Pods",
        ));
    }

    let spec = spec_replicas(obj)?;
    let labelled = int_or(obj, &["status", "fullyLabeledReplicas"], 0)?;
    let available = int_or(obj, &["status", "availableReplicas"], 0)?;
    let ready = int_or(obj, &["status", "readyReplicas"], 0)?;
    let replicas = int_or(obj, &["status", "replicas"], 0)?;

    if spec > labelled {
        return Ok(StatusResult::in_progress(
            "LessLabelled",
            format!("Labelled: {labelled}/{spec}"),
        ));
    }
    if spec > available {
        return Ok(StatusResult::in_progress(
            "LessAvailable",
            format!("Available: {available}/{spec}"),
        ));
    }
    if spec > ready {
        return Ok(StatusResult::in_progress(
            "LessReady",
            format!("Ready: {ready}/{spec}"),
        ));
    }
    if replicas > spec {
        return Ok(StatusResult::in_progress(
            "ExtraPods",
            format!("Pending termination: {}", replicas - spec),
        ));
    }

    Ok(StatusResult::current(format!(
        "ReplicaSet is available. Replicas: {replicas}"
    )))
}

pub fn pod(obj: &Unstructured) -> Result<StatusResult> {
    let conditions = conditions_of(obj);
    let phase = obj.nested_str(&["status", "phase"]).unwrap_or_default();

    match phase {
        "Succeeded" => return Ok(StatusResult::current("Pod has completed successfully")),
        "Failed" => {
            return Ok(StatusResult::failed(
                "PodFailed",
                "Pod has completed, but not successfully",
            ));
        }
        _ => {}
    }

    let crash_looping = obj
        .nested_slice(&["status", "containerStatuses"])
        .into_iter()
        .flatten()
        .any(|c| c.pointer("/state/waiting/reason").and_then(|r| r.as_str()) == Some("CrashLoopBackOff"));
    if crash_looping {
        return Ok(StatusResult::failed(
            "ContainerCrashLooping",
            "Pod has a container in CrashLoopBackOff",
        ));
    }

    if phase == "Running" {
        if find_condition(&conditions, "Ready").is_some_and(|c| c.is_true()) {
            return Ok(StatusResult::current("Pod is Ready"));
        }
        return Ok(StatusResult::in_progress(
            "PodRunningNotReady",
            "Pod is running but is not Ready",
        ));
    }

    if let Some(scheduled) = find_condition(&conditions, "PodScheduled")
        && scheduled.status == ConditionStatus::False
        && scheduled.reason == "Unschedulable"
    {
        return Ok(StatusResult::in_progress(
            "PodUnschedulable",
            "Pod could not be scheduled",
        ));
    }

    Ok(StatusResult::in_progress("PodNotReady", "Pod is not Ready"))
}

pub fn pvc(obj: &Unstructured) -> Result<StatusResult> {
    if obj.nested_str(&["status", "phase"]) != Some("Bound") {
        return Ok(StatusResult::in_progress("NotBound", "PVC is not Bound"));
    }
    Ok(StatusResult::current("PVC is Bound"))
}

pub fn service(obj: &Unstructured) -> Result<StatusResult> {
    if obj.nested_str(&["spec", "type"]) == Some("LoadBalancer") {
        let has_ingress = obj
            .nested_slice(&["status", "loadBalancer", "ingress"])
            .is_some_and(|i| !i.is_empty());
        let has_cluster_ip = obj
            .nested_str(&["spec", "clusterIP"])
            .is_some_and(|ip| !ip.is_empty());
        if !has_cluster_ip || !has_ingress {
            return Ok(StatusResult::in_progress(
                "NoIPAssigned",
                "Pending external IP assignment",
            ));
        }
    }
    Ok(StatusResult::current("Service is ready"))
}

pub fn job(obj: &Unstructured) -> Result<StatusResult> {
    let conditions = conditions_of(obj);
    let completions = int_or(obj, &["spec", "completions"], 1)?;
    let succeeded = int_or(obj, &["status", "succeeded"], 0)?;
    let active = int_or(obj, &["status", "active"], 0)?;
    let failed = int_or(obj, &["status", "failed"], 0)?;

    if find_condition(&conditions, "Failed").is_some_and(|c| c.is_true()) {
        return Ok(StatusResult::failed(
            "JobFailed",
            format!("Job Failed. failed: {failed}/{completions}"),
        ));
    }
    if find_condition(&conditions, "Complete").is_some_and(|c| c.is_true()) {
        return Ok(StatusResult::current(format!(
            "Job Completed. succeeded: {succeeded}/{completions}"
        )));
    }
    if obj.field(&["status", "startTime"]).is_none() {
        return Ok(StatusResult::in_progress("JobNotStarted", "Job not started"));
    }

    // Started jobs count as current.
    Ok(StatusResult::current(format!(
        "Job in progress. success: {succeeded}, active: {active}, failed: {failed}"
    )))
}

pub fn pdb(_obj: &Unstructured) -> Result<StatusResult> {
    Ok(StatusResult::current("AllowedDisruptions has been computed."))
}

pub fn crd(obj: &Unstructured) -> Result<StatusResult> {
    let conditions = conditions_of(obj);

    if let Some(names) = find_condition(&conditions, "NamesAccepted")
        && names.status == ConditionStatus::False
    {
        return Ok(StatusResult::failed(
            "NamesNotAccepted",
            names.message.clone(),
        ));
    }
    if find_condition(&conditions, "Established").is_some_and(|c| c.is_true()) {
        return Ok(StatusResult::current("CRD is established"));
    }
    Ok(StatusResult::in_progress("Installing", "Install in progress"))
}
