use std::time::Duration;

use assert_matches::assert_matches;

use kira_sra_dump::config::{Config, ConfigLoader, ConfigOverrides, RetryPolicy};
use kira_sra_dump::error::SraError;

#[test]
fn file_values_override_defaults() {
    let config: Config = serde_json::from_str(
        r#"{
            "workers": 4,
            "gzip": true,
            "max_size": 2048,
            "tools": { "prefetch": "/opt/sratoolkit/bin/prefetch" },
            "retry": { "max_rounds": 0, "backoff_secs": 1 }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config, &ConfigOverrides::default()).unwrap();
    assert!(resolved.gzip);
    assert_eq!(resolved.settings.workers, 4);
    assert_eq!(resolved.settings.max_size, 2048);
    assert_eq!(resolved.settings.retry.max_rounds, None);
    assert_eq!(resolved.settings.retry.backoff, Duration::from_secs(1));
    assert!(resolved.tools.prefetch.is_some());
    assert!(resolved.tools.fastq_dump.is_none());
}

#[test]
fn cli_overrides_file() {
    let config: Config =
        serde_json::from_str(r#"{ "workers": 4, "retry": { "max_rounds": 9 } }"#).unwrap();
    let overrides = ConfigOverrides {
        workers: Some(2),
        gzip: Some(true),
        max_rounds: Some(3),
        backoff_secs: Some(0),
    };

    let resolved = ConfigLoader::resolve_config(config, &overrides).unwrap();
    assert!(resolved.gzip);
    assert_eq!(resolved.settings.workers, 2);
    assert_eq!(
        resolved.settings.retry,
        RetryPolicy::from_rounds(3, Duration::ZERO)
    );
}

#[test]
fn zero_workers_rejected() {
    let config: Config = serde_json::from_str(r#"{ "workers": 0 }"#).unwrap();
    let err = ConfigLoader::resolve_config(config, &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, SraError::InvalidWorkers);
}

#[test]
fn unreadable_explicit_config() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("missing.json");
    let err = ConfigLoader::resolve(path.to_str(), &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, SraError::ConfigRead(_));
}

#[test]
fn malformed_config() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-sra.json");
    std::fs::write(&path, "{ workers: }").unwrap();
    let err = ConfigLoader::resolve(path.to_str(), &ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, SraError::ConfigParse(_));
}

#[test]
fn cli_can_turn_off_gzip_from_file() {
    let config: Config = serde_json::from_str(r#"{ "gzip": true }"#).unwrap();
    let overrides = ConfigOverrides {
        gzip: Some(false),
        ..ConfigOverrides::default()
    };

    let resolved = ConfigLoader::resolve_config(config, &overrides).unwrap();
    assert!(!resolved.gzip);

    let config: Config = serde_json::from_str(r#"{ "gzip": true }"#).unwrap();
    let resolved = ConfigLoader::resolve_config(config, &ConfigOverrides::default()).unwrap();
    assert!(resolved.gzip);
}

#[test]
fn retry_budget_only_when_requested() {
    let resolved =
        ConfigLoader::resolve_config(Config::default(), &ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.settings.retry, RetryPolicy::unbounded());

    let overrides = ConfigOverrides {
        max_rounds: Some(4),
        ..ConfigOverrides::default()
    };
    let resolved = ConfigLoader::resolve_config(Config::default(), &overrides).unwrap();
    assert_eq!(resolved.settings.retry.max_rounds, Some(4));
    assert_eq!(resolved.settings.retry.backoff, Duration::ZERO);
}
