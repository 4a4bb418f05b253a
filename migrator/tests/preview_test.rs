mod common;

use chrono::{Duration, Utc};
use common::{params, Harness};
use std::time::Duration as StdDuration;
use timeout_migrator::{EndpointFilter, PreviewRunner};

#[tokio::test]
async fn test_preview_lists_all_outstanding_endpoints() {
    let h = Harness::new(10);
    let now = Utc::now();
    h.source.seed("Sales", 3, now + Duration::days(2));
    h.source.seed("Billing", 2, now + Duration::days(400));

    let report = PreviewRunner::new(h.source.clone(), h.target.clone())
        .run(now)
        .await
        .unwrap();

    assert_eq!(report.endpoints.len(), 2);
    assert_eq!(report.endpoints[0].info.endpoint_name, "Billing");
    assert_eq!(report.endpoints[1].info.endpoint_name, "Sales");
    assert_eq!(report.endpoint("Sales").unwrap().info.nr_of_timeouts, 3);
    assert!(report.can_migrate());
    assert!(report.ongoing.is_none());
    assert!(report.endpoints.iter().all(|e| e.warnings.is_empty()));
}

#[tokio::test]
async fn test_preview_surfaces_target_problems() {
    let h = Harness::new(10);
    let now = Utc::now();
    h.source.seed("Sales", 1, now + Duration::days(1));
    h.target.add_problem("Sales", "timeouts exceed the maximum delay");

    let report = PreviewRunner::new(h.source.clone(), h.target.clone())
        .run(now)
        .await
        .unwrap();

    let sales = report.endpoint("Sales").unwrap();
    assert!(!sales.can_migrate());
    assert_eq!(sales.problems, vec!["timeouts exceed the maximum delay"]);
    assert!(!report.can_migrate());
}

#[tokio::test]
async fn test_preview_warns_about_imminent_timeouts() {
    let h = Harness::new(10);
    let now = Utc::now();
    h.source.seed("Sales", 1, now + Duration::hours(1));
    h.source.seed("Billing", 1, now + Duration::hours(5));
    h.source.seed("Shipping", 1, now - Duration::hours(3));

    let report = PreviewRunner::new(h.source.clone(), h.target.clone())
        .run(now)
        .await
        .unwrap();

    assert_eq!(report.endpoint("Sales").unwrap().warnings.len(), 1);
    assert!(report.endpoint("Billing").unwrap().warnings.is_empty());
    assert_eq!(report.endpoint("Shipping").unwrap().warnings.len(), 1);
    // Warnings don't block migration
    assert!(report.can_migrate());

    let wider = PreviewRunner::new(h.source.clone(), h.target.clone())
        .with_imminent_window(StdDuration::from_secs(6 * 3600))
        .run(now)
        .await
        .unwrap();
    assert_eq!(wider.endpoint("Billing").unwrap().warnings.len(), 1);
}

#[tokio::test]
async fn test_preview_window_beyond_representable_time() {
    let h = Harness::new(10);
    let now = Utc::now();
    h.source.seed("Sales", 1, now + Duration::days(365 * 50));
    h.source.seed("Billing", 1, now - Duration::hours(1));

    let report = PreviewRunner::new(h.source.clone(), h.target.clone())
        .with_imminent_window(StdDuration::from_secs(10_000_000_000_000))
        .run(now)
        .await
        .unwrap();

    assert_eq!(report.endpoint("Sales").unwrap().warnings.len(), 1);
    assert_eq!(report.endpoint("Billing").unwrap().warnings.len(), 1);
}

#[tokio::test]
async fn test_preview_warning_names_sub_hour_window() {
    let h = Harness::new(10);
    let now = Utc::now();
    h.source.seed("Sales", 1, now + Duration::minutes(10));

    let report = PreviewRunner::new(h.source.clone(), h.target.clone())
        .with_imminent_window(StdDuration::from_secs(30 * 60))
        .run(now)
        .await
        .unwrap();

    let warnings = &report.endpoint("Sales").unwrap().warnings;
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("within 0h30m"), "{}", warnings[0]);
}

#[tokio::test]
async fn test_preview_never_mutates_the_source() {
    let h = Harness::new(10);
    let now = Utc::now();
    h.source.seed("Sales", 4, now);

    PreviewRunner::new(h.source.clone(), h.target.clone())
        .run(now)
        .await
        .unwrap();

    for call in h.log.calls() {
        assert!(
            call == "source.try_load_ongoing_migration"
                || call == "source.list_endpoints"
                || call.starts_with("target.able_to_migrate"),
            "unexpected call {}",
            call
        );
    }
    assert_eq!(h.source.owner_of("Sales-00000").as_deref(), Some("Sales"));
    assert!(h.source.state().is_none());
}

#[tokio::test]
async fn test_preview_reports_ongoing_migration() {
    let h = Harness::new(2);
    let now = Utc::now();
    h.source.seed("Sales", 6, now);
    let cutoff = now + Duration::days(1);

    h.log.fail_at("target.stage_batch(2)");
    h.runner()
        .run(cutoff, &EndpointFilter::IncludeAll, &params(cutoff, "*"))
        .await
        .unwrap_err();

    let report = PreviewRunner::new(h.source.clone(), h.target.clone())
        .run(now)
        .await
        .unwrap();

    let ongoing = report.ongoing.as_ref().unwrap();
    assert_eq!(ongoing.endpoint, "Sales");
    assert_eq!(ongoing.completed_batches, 1);
    assert_eq!(ongoing.total_batches, 3);
    // In-flight records still count as outstanding
    assert_eq!(report.endpoint("Sales").unwrap().info.nr_of_timeouts, 4);
}
