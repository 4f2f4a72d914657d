//! Decision-engine scenarios, driven through the public API with a fixed
//! clock reading.

use chrono::Duration;
use recron::{
    ConcurrencyPolicy, JobOutcome, JobRef, ObservedJob, PassOutcome, ReconcileRequest, Reconciler,
    ResourceId, ScheduleSpec, ScheduleStatus, SkipReason,
};

use crate::common::{spec, t0};

fn reconcile(
    resource: &ResourceId,
    spec: &ScheduleSpec,
    status: &ScheduleStatus,
    observed: &[ObservedJob],
    now: chrono::DateTime<chrono::Utc>,
) -> recron::Reconciliation {
    Reconciler::new()
        .reconcile(&ReconcileRequest {
            resource,
            spec,
            status,
            created_at: t0() - Duration::hours(1),
            observed,
            now,
        })
        .unwrap()
}

#[test]
fn five_minute_schedule_launches_once_for_last_missed_tick() {
    // Schedule "*/5 * * * *", lastScheduleTime = T0, now = T0 + 11m:
    // exactly one launch, for the fire-time at T0+10m.
    let resource = ResourceId::new("report");
    let spec = spec("*/5 * * * *");
    let status = ScheduleStatus {
        active: vec![],
        last_schedule_time: Some(t0()),
    };

    let pass = reconcile(&resource, &spec, &status, &[], t0() + Duration::minutes(11));

    let fire_time = t0() + Duration::minutes(10);
    assert_eq!(pass.outcome, PassOutcome::Launched { fire_time });
    assert!(pass.launch().is_some());
    assert_eq!(pass.cancellations().len(), 0);
    assert_eq!(pass.status.last_schedule_time, Some(fire_time));
}

#[test]
fn expired_starting_deadline_abandons_but_advances() {
    // Same schedule, startingDeadlineSeconds = 30, the due fire-time is
    // 60s stale: no launch, lastScheduleTime still advances.
    let resource = ResourceId::new("report");
    let spec = spec("*/5 * * * *").with_starting_deadline_seconds(30);
    let status = ScheduleStatus {
        active: vec![],
        last_schedule_time: Some(t0()),
    };

    let pass = reconcile(&resource, &spec, &status, &[], t0() + Duration::minutes(11));

    assert!(pass.launch().is_none());
    assert_eq!(
        pass.status.last_schedule_time,
        Some(t0() + Duration::minutes(10))
    );
    assert!(matches!(
        pass.outcome,
        PassOutcome::Skipped {
            reason: SkipReason::DeadlineExpired { .. },
            ..
        }
    ));
}

#[test]
fn forbid_never_launches_while_active_regardless_of_backlog() {
    let resource = ResourceId::new("report");
    let spec = spec("*/5 * * * *").with_concurrency_policy(ConcurrencyPolicy::Forbid);
    let observed = vec![ObservedJob::running("report-busy")];

    // Whatever the window, an active job means no launch
    for minutes in [6, 11, 26, 61] {
        let status = ScheduleStatus {
            active: vec![JobRef::new("report-busy")],
            last_schedule_time: Some(t0()),
        };
        let pass = reconcile(
            &resource,
            &spec,
            &status,
            &observed,
            t0() + Duration::minutes(minutes),
        );
        assert!(
            pass.launch().is_none(),
            "launch emitted at +{}m despite active job",
            minutes
        );
    }
}

#[test]
fn replace_emits_exactly_one_cancel_and_one_launch() {
    let resource = ResourceId::new("report");
    let spec = spec("*/5 * * * *").with_concurrency_policy(ConcurrencyPolicy::Replace);
    let status = ScheduleStatus {
        active: vec![JobRef::new("report-old")],
        last_schedule_time: Some(t0()),
    };
    let observed = vec![ObservedJob::running("report-old")];

    let pass = reconcile(&resource, &spec, &status, &observed, t0() + Duration::minutes(6));

    assert_eq!(pass.cancellations(), vec![&JobRef::new("report-old")]);
    assert!(pass.launch().is_some());
}

#[test]
fn suspend_emits_no_launches_but_still_prunes() {
    let resource = ResourceId::new("report");
    let spec = spec("*/5 * * * *")
        .with_suspend(true)
        .with_successful_jobs_history_limit(0)
        .with_failed_jobs_history_limit(0);
    let status = ScheduleStatus::new();
    let observed = vec![
        ObservedJob::finished("report-ok", JobOutcome::Succeeded, t0()),
        ObservedJob::finished("report-bad", JobOutcome::Failed, t0()),
    ];

    let pass = reconcile(
        &resource,
        &spec,
        &status,
        &observed,
        t0() + Duration::hours(5),
    );

    assert_eq!(pass.outcome, PassOutcome::Suspended);
    assert!(pass.launch().is_none());
    assert!(pass.cancellations().is_empty());
    assert_eq!(pass.deletions().len(), 2);
}

#[test]
fn history_limit_two_keeps_two_most_recent_of_five() {
    let resource = ResourceId::new("report");
    let spec = spec("*/5 * * * *").with_successful_jobs_history_limit(2);
    let status = ScheduleStatus {
        active: vec![],
        last_schedule_time: Some(t0()),
    };
    let observed: Vec<ObservedJob> = (0..5i64)
        .map(|i| {
            ObservedJob::finished(
                format!("report-{}", i),
                JobOutcome::Succeeded,
                t0() - Duration::hours(5 - i),
            )
        })
        .collect();

    let pass = reconcile(&resource, &spec, &status, &observed, t0() + Duration::minutes(1));

    let deletions = pass.deletions();
    assert_eq!(deletions.len(), 3);
    assert!(deletions.contains(&&JobRef::new("report-0")));
    assert!(deletions.contains(&&JobRef::new("report-1")));
    assert!(deletions.contains(&&JobRef::new("report-2")));
}

#[test]
fn applying_a_pass_makes_the_next_pass_idle() {
    let resource = ResourceId::new("report");
    let spec = spec("*/5 * * * *");
    let status = ScheduleStatus {
        active: vec![],
        last_schedule_time: Some(t0()),
    };
    let now = t0() + Duration::minutes(11);

    let first = reconcile(&resource, &spec, &status, &[], now);
    assert!(first.launch().is_some());

    // The launched job shows up running in the executor's listing
    let launched = JobRef::scheduled(&resource, t0() + Duration::minutes(10));
    let observed = vec![ObservedJob::running(launched.as_str())];

    let second = reconcile(&resource, &spec, &first.status, &observed, now);
    assert_eq!(second.outcome, PassOutcome::Idle);
    assert!(second.actions.is_empty());
}

#[test]
fn unapplied_pass_reruns_identically() {
    let resource = ResourceId::new("report");
    let spec = spec("*/5 * * * *");
    let status = ScheduleStatus {
        active: vec![],
        last_schedule_time: Some(t0()),
    };
    let now = t0() + Duration::minutes(11);

    let first = reconcile(&resource, &spec, &status, &[], now);
    let second = reconcile(&resource, &spec, &status, &[], now);

    assert_eq!(first.actions, second.actions);
    assert_eq!(first.status, second.status);
}

#[test]
fn fire_times_are_strictly_increasing_and_in_window() {
    for expr in ["* * * * *", "*/5 * * * *", "0 * * * *", "@every 7m"] {
        let schedule = spec(expr).parse_schedule().unwrap();
        let earliest = t0();
        let latest = t0() + Duration::minutes(80);

        let fire_times = schedule.missed_runs(earliest, latest).unwrap();
        for pair in fire_times.windows(2) {
            assert!(pair[0] < pair[1], "{}: not strictly increasing", expr);
        }
        for t in &fire_times {
            assert!(*t > earliest && *t <= latest, "{}: {} out of window", expr, t);
        }
    }
}

#[test]
fn template_round_trips_untouched_through_a_pass() {
    let resource = ResourceId::new("report");
    let payload = serde_json::json!({
        "command": "./report.sh",
        "args": ["--full", "--verbose"],
        "nested": {"anything": [1, 2, 3]},
    });
    let spec = ScheduleSpec::new("*/5 * * * *", recron::JobTemplate::new(payload.clone()));
    let status = ScheduleStatus {
        active: vec![],
        last_schedule_time: Some(t0()),
    };

    let pass = reconcile(&resource, &spec, &status, &[], t0() + Duration::minutes(6));

    match pass.launch() {
        Some(recron::Action::Launch { template, .. }) => {
            assert_eq!(template.as_value(), &payload);
        }
        other => panic!("Expected launch, got {:?}", other),
    }
}
