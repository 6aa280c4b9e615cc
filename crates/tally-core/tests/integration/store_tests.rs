//! Concurrency tests for MemoryReportStore aggregate maintenance.

use std::collections::BTreeSet;

use chrono::Utc;
use tally_core::traits::ReportStore;
use tally_core::{MemoryReportStore, ReportRecord, YearMonth};

use crate::integration::common::ym;

/// Reports for one provider: `total` months starting 2018-01, the first
/// `failing` of them failed with codes cycling through three values.
fn reports(provider_id: &str, total: usize, failing: usize) -> Vec<ReportRecord> {
    let codes = ["3030", "3031", "1011"];
    let now = Utc::now();
    let mut month = ym("2018-01");
    let mut out = Vec::new();
    for i in 0..total {
        let record = if i < failing {
            ReportRecord::failure(
                provider_id,
                "TR",
                "5",
                month,
                format!("Report not valid: <Number>{}</Number>", codes[i % codes.len()]),
                None,
                now,
            )
        } else {
            ReportRecord::success(provider_id, "TR", "5", month, "{}".to_string(), now)
        };
        out.push(record);
        month = month.succ();
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_keep_aggregates_consistent() {
    let store = MemoryReportStore::new();
    let records = reports("p1", 24, 5);

    let expected_months: Vec<YearMonth> = records
        .iter()
        .filter(|r| !r.is_failed())
        .map(|r| r.year_month)
        .collect();

    // Insert in reverse order across tasks to shake up interleavings
    let handles: Vec<_> = records
        .into_iter()
        .rev()
        .map(|record| {
            let store = store.clone();
            tokio::spawn(async move { store.upsert(&record).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let aggregates = store.provider_aggregates("p1").await.unwrap().unwrap();
    assert_eq!(aggregates.earliest_report, expected_months.iter().min().copied());
    assert_eq!(aggregates.latest_report, expected_months.iter().max().copied());
    assert!(aggregates.has_failed_report);
    assert_eq!(aggregates.report_error_codes, vec!["1011", "3030", "3031"]);
    assert_eq!(aggregates.report_types, vec!["TR"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_without_failures() {
    let store = MemoryReportStore::new();
    let handles: Vec<_> = reports("p1", 12, 0)
        .into_iter()
        .map(|record| {
            let store = store.clone();
            tokio::spawn(async move { store.upsert(&record).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let aggregates = store.provider_aggregates("p1").await.unwrap().unwrap();
    assert!(!aggregates.has_failed_report);
    assert!(aggregates.report_error_codes.is_empty());
    assert_eq!(aggregates.earliest_report, Some(ym("2018-01")));
    assert_eq!(aggregates.latest_report, Some(ym("2018-12")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_for_different_providers() {
    let store = MemoryReportStore::new();
    let mut handles = Vec::new();
    for provider in ["a", "b", "c"] {
        for record in reports(provider, 6, 1) {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.upsert(&record).await }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for provider in ["a", "b", "c"] {
        let aggregates = store.provider_aggregates(provider).await.unwrap().unwrap();
        assert_eq!(aggregates.earliest_report, Some(ym("2018-02")));
        assert_eq!(aggregates.latest_report, Some(ym("2018-06")));
        assert_eq!(aggregates.report_error_codes, vec!["3030"]);
    }
}

#[tokio::test]
async fn test_deleting_only_failing_report_clears_flag() {
    let store = MemoryReportStore::new();
    let records = reports("p1", 4, 1);
    let failing_id = records[0].id;
    for record in &records {
        store.upsert(record).await.unwrap();
    }
    assert!(store.provider_aggregates("p1").await.unwrap().unwrap().has_failed_report);

    assert!(store.delete(failing_id).await.unwrap());

    let aggregates = store.provider_aggregates("p1").await.unwrap().unwrap();
    assert!(!aggregates.has_failed_report);
    assert!(aggregates.report_error_codes.is_empty());
    assert_eq!(aggregates.earliest_report, Some(ym("2018-02")));
}

#[tokio::test]
async fn test_deleting_last_report_resets_aggregates() {
    let store = MemoryReportStore::new();
    let record = ReportRecord::success("p1", "TR", "5", ym("2019-01"), "{}".into(), Utc::now());
    store.upsert(&record).await.unwrap();

    assert!(store.delete(record.id).await.unwrap());
    assert!(!store.delete(record.id).await.unwrap());

    let aggregates = store.provider_aggregates("p1").await.unwrap().unwrap();
    assert!(aggregates.earliest_report.is_none());
    assert!(aggregates.report_types.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_and_deletes() {
    let store = MemoryReportStore::new();
    let records = reports("p1", 10, 3);
    for record in &records {
        store.upsert(record).await.unwrap();
    }

    // Delete all failing reports while re-upserting the successful ones
    let mut handles = Vec::new();
    for record in records {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            if record.is_failed() {
                store.delete(record.id).await.map(|_| ())
            } else {
                store.upsert(&record).await.map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let aggregates = store.provider_aggregates("p1").await.unwrap().unwrap();
    assert!(!aggregates.has_failed_report);
    assert!(aggregates.report_error_codes.is_empty());
    assert_eq!(aggregates.earliest_report, Some(ym("2018-04")));
    assert_eq!(aggregates.latest_report, Some(ym("2018-10")));

    let remaining: BTreeSet<_> = store
        .list_for_provider("p1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.year_month)
        .collect();
    assert_eq!(remaining.len(), 7);
}
