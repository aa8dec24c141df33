// src/config/validate.rs

use std::time::Duration;

use crate::apply::{ApplierOptions, DestroyerOptions};
use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawApplySection, RawConfigFile, RawDestroySection, RawPollSection};
use crate::errors::{KapplyError, Result};
use crate::polling::PollOptions;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = KapplyError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let poll = validate_poll(&raw.poll)?;
        let apply = validate_apply(&raw.apply, &poll)?;
        let destroy = validate_destroy(&raw.destroy, &poll)?;
        Ok(ConfigFile::new_unchecked(apply, destroy, poll))
    }
}

fn validate_poll(raw: &RawPollSection) -> Result<PollOptions> {
    let poll_interval = duration_field("poll", "interval", &raw.interval)?;
    if poll_interval.is_zero() {
        return Err(KapplyError::ConfigError(
            "[poll].interval must be greater than zero".to_string(),
        ));
    }
    if raw.max_fetch_failures == 0 {
        return Err(KapplyError::ConfigError(
            "[poll].max_fetch_failures must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(PollOptions {
        poll_interval,
        read_strategy: raw.read_strategy,
        use_cache: raw.use_cache,
        max_fetch_failures: raw.max_fetch_failures,
    })
}

fn validate_apply(raw: &RawApplySection, poll: &PollOptions) -> Result<ApplierOptions> {
    ensure_positive("apply", "parallelism", raw.parallelism)?;
    ensure_positive("apply", "event_buffer", raw.event_buffer)?;
    Ok(ApplierOptions {
        inventory_policy: raw.inventory_policy,
        reconcile_timeout: optional_duration("apply", "reconcile_timeout", raw.reconcile_timeout.as_deref())?,
        prune_timeout: optional_duration("apply", "prune_timeout", raw.prune_timeout.as_deref())?,
        prune: raw.prune,
        wait_timeout_behaviour: raw.wait_timeout_behaviour,
        emit_status_events: raw.emit_status_events,
        dry_run: raw.dry_run,
        parallelism: raw.parallelism,
        error_aggregation: raw.error_aggregation,
        poll: poll.clone(),
        event_buffer: raw.event_buffer,
    })
}

fn validate_destroy(raw: &RawDestroySection, poll: &PollOptions) -> Result<DestroyerOptions> {
    ensure_positive("destroy", "parallelism", raw.parallelism)?;
    ensure_positive("destroy", "event_buffer", raw.event_buffer)?;
    Ok(DestroyerOptions {
        inventory_policy: raw.inventory_policy,
        delete_timeout: optional_duration("destroy", "delete_timeout", raw.delete_timeout.as_deref())?,
        wait_timeout_behaviour: raw.wait_timeout_behaviour,
        emit_status_events: raw.emit_status_events,
        dry_run: raw.dry_run,
        parallelism: raw.parallelism,
        error_aggregation: raw.error_aggregation,
        poll: poll.clone(),
        event_buffer: raw.event_buffer,
    })
}

fn ensure_positive(section: &str, key: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(KapplyError::ConfigError(format!(
            "[{section}].{key} must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn duration_field(section: &str, key: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| KapplyError::ConfigError(format!("[{section}].{key}: {e}")))
}

fn optional_duration(section: &str, key: &str, value: Option<&str>) -> Result<Option<Duration>> {
    value.map(|v| duration_field(section, key, v)).transpose()
}
