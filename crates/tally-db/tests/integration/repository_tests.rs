//! Integration tests for ReportRepository.
//!
//! These tests verify persistence and aggregate maintenance against a real
//! PostgreSQL database. Each test runs in an isolated container.

use chrono::Utc;
use futures::future::join_all;
use tally_core::models::ReportRecord;
use tally_db::ReportRepository;

use crate::integration::common::{failure, setup_test_db, success, ym};

#[tokio::test]
async fn test_upsert_and_get() {
    let (pool, _container) = setup_test_db().await;
    let repo = ReportRepository::new(pool);

    let report = success("p1", "TR", "2019-01");
    let id = repo.upsert(&report).await.expect("upsert should succeed");
    assert_eq!(id, report.id);

    let stored = repo.get(id).await.unwrap().expect("report should exist");
    assert_eq!(stored.provider_id, "p1");
    assert_eq!(stored.year_month, ym("2019-01"));
    assert_eq!(stored.payload, report.payload);
    assert!(!stored.is_failed());

    let aggregates = repo.provider_aggregates("p1").await.unwrap().unwrap();
    assert_eq!(aggregates.earliest_report, Some(ym("2019-01")));
    assert_eq!(aggregates.latest_report, Some(ym("2019-01")));
    assert_eq!(aggregates.report_types, vec!["TR"]);
    assert!(!aggregates.has_failed_report);
}

#[tokio::test]
async fn test_upsert_is_idempotent_and_keeps_created_at() {
    let (pool, _container) = setup_test_db().await;
    let repo = ReportRepository::new(pool);

    let first = success("p1", "TR", "2019-01");
    repo.upsert(&first).await.unwrap();

    let mut second = success("p1", "TR", "2019-01");
    second.created_at = Utc::now() + chrono::Duration::hours(1);
    repo.upsert(&second).await.unwrap();

    let reports = repo.list_for_provider("p1").await.unwrap();
    assert_eq!(reports.len(), 1, "same key must map to one row");
    assert!(
        reports[0].created_at < second.created_at,
        "created_at of the first insert must survive the update"
    );
}

#[tokio::test]
async fn test_success_replaces_failed_attempt() {
    let (pool, _container) = setup_test_db().await;
    let repo = ReportRepository::new(pool);

    repo.upsert(&failure("p1", "TR", "2019-02", 3030)).await.unwrap();
    assert!(repo.successful_months("p1", "TR", "5").await.unwrap().is_empty());
    assert!(repo.provider_aggregates("p1").await.unwrap().unwrap().has_failed_report);

    repo.upsert(&success("p1", "TR", "2019-02")).await.unwrap();
    let months = repo.successful_months("p1", "TR", "5").await.unwrap();
    assert!(months.contains(&ym("2019-02")));

    let aggregates = repo.provider_aggregates("p1").await.unwrap().unwrap();
    assert!(!aggregates.has_failed_report);
    assert!(aggregates.report_error_codes.is_empty());
}

#[tokio::test]
async fn test_concurrent_upserts_keep_aggregates_consistent() {
    let (pool, _container) = setup_test_db().await;
    let repo = ReportRepository::new(pool);

    let months = [
        "2018-01", "2018-02", "2018-03", "2018-04", "2018-05", "2018-06", "2018-07", "2018-08",
    ];
    let mut reports: Vec<ReportRecord> = months.iter().map(|m| success("p1", "TR", m)).collect();
    reports.push(failure("p1", "DR", "2018-01", 3030));
    reports.push(failure("p1", "DR", "2018-02", 3031));
    reports.push(failure("p1", "PR", "2018-01", 3030));

    let results = join_all(reports.iter().map(|r| {
        let repo = repo.clone();
        async move { repo.upsert(r).await }
    }))
    .await;
    assert!(results.iter().all(Result::is_ok));

    let aggregates = repo.provider_aggregates("p1").await.unwrap().unwrap();
    assert_eq!(aggregates.earliest_report, Some(ym("2018-01")));
    assert_eq!(aggregates.latest_report, Some(ym("2018-08")));
    assert_eq!(aggregates.report_types, vec!["DR", "PR", "TR"]);
    assert!(aggregates.has_failed_report);
    assert_eq!(aggregates.report_error_codes, vec!["3030", "3031"]);
}

#[tokio::test]
async fn test_delete_only_failure_clears_flag() {
    let (pool, _container) = setup_test_db().await;
    let repo = ReportRepository::new(pool);

    repo.upsert(&success("p1", "TR", "2019-01")).await.unwrap();
    let failed = failure("p1", "TR", "2019-02", 3030);
    repo.upsert(&failed).await.unwrap();

    assert!(repo.delete(failed.id).await.unwrap());
    assert!(!repo.delete(failed.id).await.unwrap(), "second delete finds nothing");

    let aggregates = repo.provider_aggregates("p1").await.unwrap().unwrap();
    assert!(!aggregates.has_failed_report);
    assert!(aggregates.report_error_codes.is_empty());
    assert_eq!(aggregates.report_types, vec!["TR"]);
}

#[tokio::test]
async fn test_providers_are_isolated() {
    let (pool, _container) = setup_test_db().await;
    let repo = ReportRepository::new(pool);

    repo.upsert(&failure("p1", "TR", "2019-01", 2000)).await.unwrap();
    repo.upsert(&success("p2", "TR", "2019-03")).await.unwrap();

    assert!(repo.provider_aggregates("p1").await.unwrap().unwrap().has_failed_report);
    assert!(!repo.provider_aggregates("p2").await.unwrap().unwrap().has_failed_report);
    assert!(repo.provider_aggregates("p3").await.unwrap().is_none());
    assert_eq!(repo.list_for_provider("p2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_health_check() {
    let (pool, _container) = setup_test_db().await;
    let repo = ReportRepository::new(pool);
    repo.health_check().await.expect("database should be reachable");
}
