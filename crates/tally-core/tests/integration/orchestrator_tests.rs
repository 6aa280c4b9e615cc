//! Integration tests for the tenant/provider Orchestrator.

use std::time::Duration;

use crate::integration::common::{
    MockAdapterFactory, MockDirectory, MockResponse, active_provider, aggregated_provider,
    inactive_provider, ym,
};
use tally_core::traits::ReportStore;
use tally_core::{
    AppError, HarvestConfig, HarvestService, MemoryReportStore, Orchestrator, OrchestratorConfig,
};

fn orchestrator(
    store: &MemoryReportStore,
    directory: MockDirectory,
    factory: &MockAdapterFactory,
) -> Orchestrator<MemoryReportStore, MockDirectory, MockAdapterFactory> {
    let harvest_config = HarvestConfig::default().with_current_month(ym("2016-05"));
    let harvest =
        HarvestService::with_config(store.clone(), directory, factory.clone(), harvest_config);
    let config = OrchestratorConfig {
        tenant_concurrency: 2,
        provider_concurrency: 3,
        provider_timeout: Duration::from_secs(30),
    };
    Orchestrator::with_config(harvest, config)
}

#[tokio::test]
async fn test_run_harvests_active_providers_of_all_tenants() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let directory = MockDirectory::new()
        .with_tenant(
            "diku",
            vec![
                active_provider("p1", &["TR"], "2016-03"),
                inactive_provider("p2", &["TR"], "2016-03"),
            ],
        )
        .with_tenant("other", vec![active_provider("p3", &["DR"], "2016-04")]);

    let summary = orchestrator(&store, directory, &factory).run().await.unwrap();

    assert_eq!(summary.total_tenants(), 2);
    assert_eq!(summary.failed_tenants(), 0);
    assert_eq!(summary.total_providers(), 2, "inactive providers are filtered out");
    assert_eq!(summary.total_stats().fetched, 3);
    assert!(store.provider_aggregates("p2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_null_aggregator_fails_only_that_provider() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let directory = MockDirectory::new().with_tenant(
        "diku",
        vec![
            aggregated_provider("broken", None, &["JR1"], "2016-01"),
            active_provider("ok-1", &["JR1"], "2016-04"),
            active_provider("ok-2", &["JR1"], "2016-04"),
        ],
    );

    let summary = orchestrator(&store, directory, &factory).run().await.unwrap();

    let tenant = &summary.tenants[0];
    assert!(tenant.is_success());
    assert_eq!(tenant.providers.len(), 3);
    assert_eq!(tenant.failed_providers(), 1);

    let broken = tenant
        .providers
        .iter()
        .find(|p| p.provider_id == "broken")
        .unwrap();
    assert!(broken.error().unwrap().contains("No aggregator found"));

    for id in ["ok-1", "ok-2"] {
        let aggregates = store.provider_aggregates(id).await.unwrap().unwrap();
        assert_eq!(aggregates.latest_report, Some(ym("2016-04")));
    }
}

#[tokio::test]
async fn test_tenant_without_module_is_isolated() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let directory = MockDirectory::new()
        .with_tenant("disabled", vec![active_provider("p1", &["TR"], "2016-04")])
        .with_tenant("enabled", vec![active_provider("p2", &["TR"], "2016-04")])
        .with_module_disabled("disabled");

    let summary = orchestrator(&store, directory, &factory).run().await.unwrap();

    assert_eq!(summary.failed_tenants(), 1);
    let disabled = summary.tenants.iter().find(|t| t.tenant == "disabled").unwrap();
    assert!(disabled.error.as_deref().unwrap().contains("not enabled"));
    assert!(disabled.providers.is_empty());
    assert_eq!(factory.created_for(), vec!["p2"]);
}

#[tokio::test]
async fn test_month_failures_do_not_fail_provider() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    factory.respond("p1", "TR", ym("2016-03"), MockResponse::Status(500));
    let directory =
        MockDirectory::new().with_tenant("diku", vec![active_provider("p1", &["TR"], "2016-03")]);

    let summary = orchestrator(&store, directory, &factory).run().await.unwrap();

    assert_eq!(summary.failed_providers(), 0);
    let totals = summary.total_stats();
    assert_eq!(totals.fetched, 1);
    assert_eq!(totals.failed, 1);
}

#[tokio::test]
async fn test_tenant_listing_failure_aborts_batch() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let directory = MockDirectory::new().with_failing_tenant_listing();

    let err = orchestrator(&store, directory, &factory).run().await.unwrap_err();
    assert!(matches!(err, AppError::Transport { .. }));
}

#[tokio::test]
async fn test_no_tenants_aborts_batch() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();

    let err = orchestrator(&store, MockDirectory::new(), &factory)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoTenants));
}

#[tokio::test]
async fn test_run_single_tenant() {
    let store = MemoryReportStore::new();
    let factory = MockAdapterFactory::new();
    let directory = MockDirectory::new()
        .with_tenant("a", vec![active_provider("p1", &["TR"], "2016-04")])
        .with_tenant("b", vec![active_provider("p2", &["TR"], "2016-04")]);

    let result = orchestrator(&store, directory, &factory).run_tenant("b").await;

    assert!(result.is_success());
    assert_eq!(result.providers.len(), 1);
    assert_eq!(factory.created_for(), vec!["p2"]);
}
