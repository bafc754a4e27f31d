//! Tests for the shared demo plumbing.

use std::io::Write;

use batchexec_adapter_torque::TorqueConfig;
use batchexec_demos::{
    default_registry, load_config, load_config_with, log_filter, resolve_executor,
};

#[test]
fn test_log_filter_levels() {
    assert_eq!(log_filter(0, false), "warn");
    assert_eq!(log_filter(1, false), "info");
    assert_eq!(log_filter(2, false), "debug");
    assert_eq!(log_filter(0, true), "debug");
    assert_eq!(log_filter(3, false), "trace");
    assert_eq!(log_filter(5, true), "trace");
}

#[test]
fn test_default_registry_knows_torque() {
    let registry = default_registry(TorqueConfig::default());
    assert!(registry.has_executor("torque"));
    assert_eq!(registry.available_executors(), vec!["torque"]);
}

#[test]
fn test_unknown_scheduler_is_reported() {
    let registry = default_registry(TorqueConfig::default());
    let err = resolve_executor(&registry, Some("slurm"), "batch")
        .err()
        .expect("slurm is not registered");
    let message = format!("{err:#}");
    assert!(message.contains("slurm"), "{message}");
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "default_vmem: 2gb\nexecutor:\n  timeout_secs: 120").unwrap();

    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.default_vmem, "2gb");
    assert_eq!(config.executor.timeout_secs, 120);
}

#[test]
fn test_load_config_missing_file() {
    let err = load_config(Some(std::path::Path::new("/nonexistent/batchexec.yaml")))
        .unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/batchexec.yaml"));
}

#[test]
fn test_env_override_corrects_file_value() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "executor:\n  status_calls: 0").unwrap();

    let config = load_config_with(Some(file.path()), |key| {
        (key == "BATCHEXEC_STATUS_CALLS").then(|| "5".to_string())
    })
    .unwrap();
    assert_eq!(config.executor.status_calls, 5);
}

#[test]
fn test_invalid_file_value_without_override() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "executor:\n  status_calls: 0").unwrap();

    let err = load_config_with(Some(file.path()), |_| None).unwrap_err();
    assert!(format!("{err:#}").contains("status_calls"), "{err:#}");
}
