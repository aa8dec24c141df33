use std::error::Error;
use std::io::Write;
use std::time::Duration;

use kapply::config::{default_config_path, load_and_validate, load_from_path};
use kapply::{
    DryRunStrategy, ErrorAggregation, ErrorKind, InventoryPolicy, KapplyError, ReadStrategy,
    WaitTimeoutBehaviour,
};
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn full_file_is_loaded_into_runtime_options() -> TestResult {
    let file = write_config(
        r#"
[apply]
inventory_policy = "adopt-if-no-inventory"
reconcile_timeout = "2m"
prune_timeout = "30s"
prune = false
wait_timeout_behaviour = "abort"
dry_run = "server"
parallelism = 8
error_aggregation = "any-error"

[destroy]
inventory_policy = "adopt-all"
delete_timeout = "1m"
emit_status_events = false

[poll]
interval = "500ms"
read_strategy = "individual"
use_cache = false
max_fetch_failures = 5
"#,
    )?;

    let config = load_and_validate(file.path())?;

    assert_eq!(config.apply.inventory_policy, InventoryPolicy::AdoptIfNoInventory);
    assert_eq!(config.apply.reconcile_timeout, Some(Duration::from_secs(120)));
    assert_eq!(config.apply.prune_timeout, Some(Duration::from_secs(30)));
    assert!(!config.apply.prune);
    assert_eq!(config.apply.wait_timeout_behaviour, WaitTimeoutBehaviour::Abort);
    assert_eq!(config.apply.dry_run, DryRunStrategy::Server);
    assert_eq!(config.apply.parallelism, 8);
    assert_eq!(config.apply.error_aggregation, ErrorAggregation::AnyError);

    assert_eq!(config.destroy.inventory_policy, InventoryPolicy::AdoptAll);
    assert_eq!(config.destroy.delete_timeout, Some(Duration::from_secs(60)));
    assert!(!config.destroy.emit_status_events);

    assert_eq!(config.poll.poll_interval, Duration::from_millis(500));
    assert_eq!(config.poll.read_strategy, ReadStrategy::Individual);
    assert!(!config.poll.use_cache);
    assert_eq!(config.poll.max_fetch_failures, 5);

    // Both entry points poll the same way.
    assert_eq!(config.apply.poll, config.poll);
    assert_eq!(config.destroy.poll, config.poll);
    Ok(())
}

#[test]
fn empty_file_uses_defaults() -> TestResult {
    let file = write_config("")?;
    let config = load_and_validate(file.path())?;

    assert_eq!(config.apply.inventory_policy, InventoryPolicy::MustMatch);
    assert!(config.apply.prune);
    assert_eq!(config.apply.reconcile_timeout, None);
    assert_eq!(config.destroy.delete_timeout, None);
    assert_eq!(config.poll.poll_interval, Duration::from_secs(2));
    Ok(())
}

#[test]
fn zero_parallelism_is_rejected_with_its_key() -> TestResult {
    let file = write_config("[destroy]\nparallelism = 0\n")?;
    let err = load_and_validate(file.path()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("[destroy].parallelism"), "{err}");
    Ok(())
}

#[test]
fn bad_duration_is_rejected_with_its_key() -> TestResult {
    let file = write_config("[apply]\nreconcile_timeout = \"soon\"\n")?;
    let err = load_and_validate(file.path()).unwrap_err();

    assert!(matches!(err, KapplyError::ConfigError(_)));
    assert!(err.to_string().contains("[apply].reconcile_timeout"), "{err}");
    Ok(())
}

#[test]
fn unknown_policy_is_a_toml_error() -> TestResult {
    let file = write_config("[apply]\ninventory_policy = \"take-everything\"\n")?;
    let err = load_from_path(file.path()).unwrap_err();
    assert!(matches!(err, KapplyError::TomlError(_)));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_and_validate(dir.path().join(default_config_path())).unwrap_err();
    assert!(matches!(err, KapplyError::IoError(_)));
}
