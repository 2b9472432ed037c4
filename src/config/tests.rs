//! Tests for engine configuration parsing and validation.

use std::time::Duration;

use rstest::rstest;

use super::{
    ConfigError, DEFAULT_JOB_POLL_INTERVAL_SECS, DEFAULT_JOB_WAIT_TIMEOUT_SECS, EngineConfig,
};

fn config() -> EngineConfig {
    EngineConfig {
        static_service_instance: None,
        service_zone: None,
        service_version: None,
        job_properties: Vec::new(),
        job_wait_timeout_secs: DEFAULT_JOB_WAIT_TIMEOUT_SECS,
        job_poll_interval_secs: DEFAULT_JOB_POLL_INTERVAL_SECS,
        poll_jitter: 0.0,
        max_parallelism: 4,
    }
}

#[test]
fn default_job_properties_parses_key_value_entries() {
    let mut cfg = config();
    cfg.job_properties = vec![
        String::from("spark.executor.cores=2"),
        String::from("spark.eventLog.enabled=true"),
    ];

    let properties = cfg.default_job_properties().expect("entries are well formed");
    assert_eq!(
        properties.get("spark.executor.cores").map(String::as_str),
        Some("2")
    );
    assert_eq!(
        properties.get("spark.eventLog.enabled").map(String::as_str),
        Some("true")
    );
}

#[rstest]
#[case("novalue")]
#[case("=orphaned")]
#[case("  =x")]
fn malformed_property_entries_are_rejected(#[case] entry: &str) {
    let mut cfg = config();
    cfg.job_properties = vec![entry.to_owned()];

    let err = cfg
        .default_job_properties()
        .expect_err("entry must be rejected");
    assert!(matches!(err, ConfigError::InvalidProperty { .. }));
}

#[test]
fn empty_value_is_allowed_in_property_entries() {
    let mut cfg = config();
    cfg.job_properties = vec![String::from("flag=")];
    let properties = cfg.default_job_properties().expect("empty values are legal");
    assert_eq!(properties.get("flag").map(String::as_str), Some(""));
}

#[rstest]
#[case::zero_poll(0, 0.0, 4, "job_poll_interval_secs")]
#[case::bad_jitter(5, 1.5, 4, "poll_jitter")]
#[case::zero_parallelism(5, 0.0, 0, "max_parallelism")]
fn out_of_range_values_fail_validation(
    #[case] poll_secs: u64,
    #[case] jitter: f64,
    #[case] parallelism: usize,
    #[case] field: &str,
) {
    let mut cfg = config();
    cfg.job_poll_interval_secs = poll_secs;
    cfg.poll_jitter = jitter;
    cfg.max_parallelism = parallelism;

    let err = cfg.validate().expect_err("validation must fail");
    assert!(
        matches!(err, ConfigError::OutOfRange { field: name, .. } if name == field),
        "unexpected field for {field}"
    );
}

#[test]
fn retry_policy_reflects_the_configured_intervals() {
    let mut cfg = config();
    cfg.job_wait_timeout_secs = 120;
    cfg.job_poll_interval_secs = 3;
    cfg.poll_jitter = 0.25;

    let policy = cfg.retry_policy();
    assert_eq!(policy.timeout(), Duration::from_secs(120));
    assert_eq!(policy.poll_interval(), Duration::from_secs(3));
    assert_eq!(policy.jitter(), 0.25);
}

#[test]
fn static_instance_marks_the_service_user_managed() {
    let mut cfg = config();
    assert!(!cfg.is_user_managed());

    cfg.static_service_instance = Some(String::from("shared-cluster"));
    assert!(cfg.is_user_managed());
    assert_eq!(cfg.resource_id().as_str(), "shared-cluster");
}

#[test]
fn generated_resource_ids_are_prefixed_and_unique() {
    let cfg = config();
    let first = cfg.resource_id();
    let second = cfg.resource_id();
    assert!(first.as_str().starts_with("gantry-"));
    assert_ne!(first, second);
}

#[test]
fn runner_honours_the_configured_parallelism() {
    let mut cfg = config();
    cfg.max_parallelism = 2;
    assert_eq!(cfg.runner().limit().get(), 2);
}
