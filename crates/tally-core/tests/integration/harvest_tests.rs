//! Integration tests for HarvestService.
//!
//! These tests verify the per-provider harvesting logic against the
//! in-memory report store and mock adapters.

use crate::integration::common::{
    MockAdapterFactory, MockDirectory, MockResponse, active_provider, aggregated_provider,
    inactive_provider, mock_aggregator, ym,
};
use tally_core::traits::ReportStore;
use tally_core::{
    AppError, HarvestConfig, HarvestService, MemoryReportStore, ProviderHarvestOutcome,
    SkipReason, report_id,
};

const TENANT: &str = "diku";

fn service(
    store: &MemoryReportStore,
    directory: MockDirectory,
    factory: &MockAdapterFactory,
) -> HarvestService<MemoryReportStore, MockDirectory, MockAdapterFactory> {
    let config = HarvestConfig::default()
        .with_current_month(ym("2016-05"))
        .with_concurrency(3);
    HarvestService::with_config(store.clone(), directory, factory.clone(), config)
}

#[tokio::test]
async fn test_harvest_fetches_every_month_up_to_ceiling() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let service = service(&store, MockDirectory::new(), &factory);
    let provider = active_provider("p1", &["TR", "DR"], "2016-02");

    let outcome = service.harvest_provider(TENANT, &provider).await.unwrap();

    let stats = outcome.stats();
    assert_eq!(stats.fetched, 6, "two reports x three months (02..04)");
    assert_eq!(stats.failed, 0);
    assert_eq!(factory.fetch_count(), 6);
    assert_eq!(store.len(), 6);

    let aggregates = store.provider_aggregates("p1").await.unwrap().unwrap();
    assert_eq!(aggregates.earliest_report, Some(ym("2016-02")));
    assert_eq!(aggregates.latest_report, Some(ym("2016-04")));
    assert_eq!(aggregates.report_types, vec!["DR", "TR"]);
    assert!(!aggregates.has_failed_report);
}

#[tokio::test]
async fn test_harvest_twice_is_idempotent() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let service = service(&store, MockDirectory::new(), &factory);
    let provider = active_provider("p1", &["TR"], "2016-03");

    service.harvest_provider(TENANT, &provider).await.unwrap();
    let second = service.harvest_provider(TENANT, &provider).await.unwrap();

    assert_eq!(store.len(), 2);
    let stats = second.stats();
    assert_eq!(stats.fetched, 0, "stored months are not fetched again");
    assert_eq!(stats.already_stored, 2);
    assert_eq!(factory.fetch_count(), 2);
}

#[tokio::test]
async fn test_inactive_provider_makes_no_requests_or_writes() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let service = service(&store, MockDirectory::new(), &factory);
    let provider = inactive_provider("p1", &["TR"], "2015-01");

    let outcome = service.harvest_provider(TENANT, &provider).await.unwrap();

    assert_eq!(outcome, ProviderHarvestOutcome::Skipped(SkipReason::Inactive));
    assert_eq!(factory.fetch_count(), 0);
    assert!(factory.created_for().is_empty());
    assert!(store.is_empty());
    assert!(store.provider_aggregates("p1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_soap_exception_becomes_failed_attempt() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    factory.respond(
        "p1",
        "JR1",
        ym("2016-03"),
        MockResponse::Exception(
            "<s:Exception><s:Number>3030</s:Number><s:Message>No Usage Available</s:Message></s:Exception>"
                .to_string(),
        ),
    );
    let service = service(&store, MockDirectory::new(), &factory);
    let provider = active_provider("p1", &["JR1"], "2016-03");

    let stats = service.harvest_provider(TENANT, &provider).await.unwrap().stats();
    assert_eq!(stats.fetched, 1);
    assert_eq!(stats.failed, 1);

    let failed = store
        .get(report_id("p1", "JR1", "5", ym("2016-03")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.failed_attempts, Some(1));
    assert!(failed.payload.is_none());
    assert!(failed.failed_reason.as_deref().unwrap().starts_with("Report not valid"));

    let aggregates = store.provider_aggregates("p1").await.unwrap().unwrap();
    assert!(aggregates.has_failed_report);
    assert_eq!(aggregates.report_error_codes, vec!["3030"]);
    assert_eq!(aggregates.earliest_report, Some(ym("2016-04")));
}

#[tokio::test]
async fn test_failed_attempts_accumulate_across_runs() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    factory.respond("p1", "TR", ym("2016-04"), MockResponse::Status(503));
    let service = service(&store, MockDirectory::new(), &factory);
    let provider = active_provider("p1", &["TR"], "2016-04");

    for _ in 0..3 {
        service.harvest_provider(TENANT, &provider).await.unwrap();
    }

    let record = store
        .get(report_id("p1", "TR", "5", ym("2016-04")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.failed_attempts, Some(3));
    assert!(record.failed_reason.as_deref().unwrap().contains("HTTP 503"));
    assert_eq!(factory.fetch_count(), 3, "failed months are fetched again each run");

    // Recovery replaces the failed record
    factory.respond("p1", "TR", ym("2016-04"), MockResponse::Report("{}".to_string()));
    service.harvest_provider(TENANT, &provider).await.unwrap();

    let record = store
        .get(report_id("p1", "TR", "5", ym("2016-04")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.failed_attempts, None);
    assert!(!store.provider_aggregates("p1").await.unwrap().unwrap().has_failed_report);
}

#[tokio::test]
async fn test_aggregator_without_id_fails_provider() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let service = service(&store, MockDirectory::new(), &factory);
    let provider = aggregated_provider("p1", None, &["JR1"], "2016-01");

    let err = service.harvest_provider(TENANT, &provider).await.unwrap_err();

    assert!(matches!(err, AppError::NoAggregator(ref id) if id == "p1"));
    assert!(err.to_string().contains("No aggregator found"));
    assert_eq!(factory.fetch_count(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_aggregator_lookup_failure_keeps_cause() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let service = service(&store, MockDirectory::new(), &factory);
    let provider = aggregated_provider("p1", Some("missing"), &["JR1"], "2016-01");

    let err = service.harvest_provider(TENANT, &provider).await.unwrap_err();

    match err {
        AppError::AggregatorLookup { id, source } => {
            assert_eq!(id, "missing");
            assert!(source.to_string().contains("HTTP 404"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_harvest_through_aggregator() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let directory = MockDirectory::new().with_aggregator(mock_aggregator("agg-1"));
    let service = service(&store, directory, &factory);
    let provider = aggregated_provider("p1", Some("agg-1"), &["JR1"], "2016-04");

    let stats = service.harvest_provider(TENANT, &provider).await.unwrap().stats();

    assert_eq!(stats.fetched, 1);
    assert_eq!(factory.created_for(), vec!["p1"]);
}

#[tokio::test]
async fn test_unknown_service_type() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let service = service(&store, MockDirectory::new(), &factory);
    let mut provider = active_provider("p1", &["JR1"], "2016-01");
    if let Some(sushi) = provider.harvesting_config.sushi_config.as_mut() {
        sushi.service_type = Some("nope".to_string());
    }

    let err = service.harvest_provider(TENANT, &provider).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownServiceType(ref t) if t == "nope"));
}

#[tokio::test]
async fn test_missing_start_is_precondition_failure() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let service = service(&store, MockDirectory::new(), &factory);
    let mut provider = active_provider("p1", &["JR1"], "2016-01");
    provider.harvesting_config.harvesting_start = None;

    let err = service.harvest_provider(TENANT, &provider).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidYearMonth(_)));
    assert_eq!(factory.fetch_count(), 0);
}

#[tokio::test]
async fn test_harvest_provider_by_id() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let directory =
        MockDirectory::new().with_tenant(TENANT, vec![active_provider("p1", &["TR"], "2016-04")]);
    let service = service(&store, directory, &factory);

    let stats = service.harvest_provider_by_id(TENANT, "p1").await.unwrap().stats();
    assert_eq!(stats.fetched, 1);

    let err = service.harvest_provider_by_id(TENANT, "nope").await.unwrap_err();
    assert!(matches!(err, AppError::ProviderNotFound(_)));
}
