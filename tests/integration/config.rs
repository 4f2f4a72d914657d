//! Resource definition loading tests.

use recron::{load_resources_from_directory, ConcurrencyPolicy, ConfigError};

#[test]
fn loads_a_directory_of_definitions() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("report.yaml"),
        r#"
id: nightly-report
schedule: "0 2 * * *"
concurrency_policy: Forbid
successful_jobs_history_limit: 2
job_template:
  command: ./report.sh
  args: ["--full"]
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("cleanup.yaml"),
        r#"
id: cleanup
schedule:
  cron: "@daily"
  timezone: Europe/Berlin
job_template:
  command: ./cleanup.sh
"#,
    )
    .unwrap();

    let resources = load_resources_from_directory(dir.path()).unwrap();
    assert_eq!(resources.len(), 2);

    let (cleanup_id, cleanup) = &resources[0];
    assert_eq!(cleanup_id.as_str(), "cleanup");
    assert_eq!(cleanup.timezone.as_deref(), Some("Europe/Berlin"));

    let (report_id, report) = &resources[1];
    assert_eq!(report_id.as_str(), "nightly-report");
    assert_eq!(report.concurrency_policy, ConcurrencyPolicy::Forbid);
    assert_eq!(report.successful_jobs_history_limit, Some(2));
    assert_eq!(report.job_template.as_value()["args"][0], "--full");
}

#[test]
fn unknown_policy_string_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("typo.yaml"),
        r#"
id: typo
schedule: "@hourly"
concurrency_policy: Paralel
job_template:
  command: "true"
"#,
    )
    .unwrap();

    let result = load_resources_from_directory(dir.path());
    assert!(matches!(result, Err(ConfigError::InvalidResource { .. })));
}

#[test]
fn malformed_cron_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("bad.yaml"),
        "id: bad\nschedule: \"99 99 * * *\"\njob_template:\n  command: \"true\"\n",
    )
    .unwrap();

    let result = load_resources_from_directory(dir.path());
    assert!(matches!(result, Err(ConfigError::InvalidResource { .. })));
}

#[test]
fn loaded_spec_validates_and_evaluates() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("every.yaml"),
        "id: every\nschedule: \"@every 10m\"\njob_template:\n  command: \"true\"\n",
    )
    .unwrap();

    let resources = load_resources_from_directory(dir.path()).unwrap();
    let (_, spec) = &resources[0];

    let schedule = spec.parse_schedule().unwrap();
    let base = chrono::Utc::now();
    let upcoming = schedule.next_n_after(base, 2).unwrap();
    assert_eq!(upcoming.len(), 2);
}
