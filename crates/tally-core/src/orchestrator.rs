//! Batch harvesting across tenants.
//!
//! The [`Orchestrator`] enumerates tenants, checks that the harvesting module
//! is enabled for each, lists the tenant's providers and harvests the active
//! ones through [`HarvestService`]. Tenants and providers run concurrently
//! within the configured bounds. Failures are isolated: a failing provider
//! never affects its siblings and a failing tenant never affects other
//! tenants. Only a failure to enumerate tenants aborts the run.

use futures::stream::{self, StreamExt};

use crate::config::OrchestratorConfig;
use crate::harvest::HarvestService;
use crate::models::Provider;
use crate::progress::{HarvestEvent, ProgressReporter, SilentReporter};
use crate::stats::{BatchHarvestSummary, ProviderHarvestResult, TenantHarvestResult};
use crate::traits::{AdapterFactory, ReportStore, TenantDirectory};
use crate::AppError;

/// Drives harvest runs over all tenants of a directory.
pub struct Orchestrator<S, D, F>
where
    S: ReportStore,
    D: TenantDirectory,
    F: AdapterFactory,
{
    harvest: HarvestService<S, D, F>,
    config: OrchestratorConfig,
}

impl<S, D, F> Orchestrator<S, D, F>
where
    S: ReportStore,
    D: TenantDirectory,
    F: AdapterFactory,
{
    pub fn new(harvest: HarvestService<S, D, F>) -> Self {
        Self::with_config(harvest, OrchestratorConfig::default())
    }

    pub fn with_config(harvest: HarvestService<S, D, F>, config: OrchestratorConfig) -> Self {
        Self { harvest, config }
    }

    pub fn harvest_service(&self) -> &HarvestService<S, D, F> {
        &self.harvest
    }

    /// Harvests every tenant.
    ///
    /// # Errors
    ///
    /// Fails only if the tenant list cannot be retrieved or is empty.
    pub async fn run(&self) -> Result<BatchHarvestSummary, AppError> {
        self.run_with_progress(&SilentReporter).await
    }

    /// Same as [`run`](Self::run), with progress reporting.
    pub async fn run_with_progress<R: ProgressReporter>(
        &self,
        reporter: &R,
    ) -> Result<BatchHarvestSummary, AppError> {
        let tenants = self.harvest.directory().list_tenants().await?;
        if tenants.is_empty() {
            return Err(AppError::NoTenants);
        }

        reporter.report(HarvestEvent::BatchStarted {
            total_tenants: tenants.len(),
        });

        let mut summary = BatchHarvestSummary::new();
        let results: Vec<TenantHarvestResult> = stream::iter(tenants.iter())
            .map(|tenant| self.run_tenant_with_progress(tenant, reporter))
            .buffer_unordered(self.config.tenant_concurrency.max(1))
            .collect()
            .await;
        for result in results {
            summary.add(result);
        }

        reporter.report(HarvestEvent::BatchCompleted { summary: &summary });
        Ok(summary)
    }

    /// Harvests a single tenant.
    pub async fn run_tenant(&self, tenant: &str) -> TenantHarvestResult {
        self.run_tenant_with_progress(tenant, &SilentReporter).await
    }

    /// Same as [`run_tenant`](Self::run_tenant), with progress reporting.
    pub async fn run_tenant_with_progress<R: ProgressReporter>(
        &self,
        tenant: &str,
        reporter: &R,
    ) -> TenantHarvestResult {
        reporter.report(HarvestEvent::TenantStarted { tenant });

        let providers = match self.active_providers(tenant).await {
            Ok(providers) => providers,
            Err(e) => {
                let error = e.to_string();
                tracing::warn!(tenant, error = %e, "Tenant not harvested");
                reporter.report(HarvestEvent::TenantFailed {
                    tenant,
                    error: &error,
                });
                return TenantHarvestResult::failed(tenant.to_string(), error);
            }
        };

        let results: Vec<ProviderHarvestResult> = stream::iter(providers.iter())
            .map(|provider| self.run_provider(tenant, provider, reporter))
            .buffer_unordered(self.config.provider_concurrency.max(1))
            .collect()
            .await;

        let result = TenantHarvestResult::completed(tenant.to_string(), results);
        reporter.report(HarvestEvent::TenantCompleted {
            tenant,
            providers: result.providers.len(),
            failed_providers: result.failed_providers(),
        });
        result
    }

    /// Module check plus provider listing, filtered to active providers.
    async fn active_providers(&self, tenant: &str) -> Result<Vec<Provider>, AppError> {
        let directory = self.harvest.directory();
        directory.check_module_enabled(tenant).await?;

        let providers = directory.list_providers(tenant).await?;
        let total = providers.len();
        let active: Vec<Provider> = providers.into_iter().filter(Provider::is_active).collect();

        tracing::info!(
            tenant,
            providers = total,
            active = active.len(),
            "Providers listed"
        );
        Ok(active)
    }

    /// Harvests one provider under the provider timeout.
    async fn run_provider<R: ProgressReporter>(
        &self,
        tenant: &str,
        provider: &Provider,
        reporter: &R,
    ) -> ProviderHarvestResult {
        reporter.report(HarvestEvent::ProviderStarted {
            tenant,
            provider_id: &provider.id,
            provider_label: &provider.label,
        });

        let timeout = self.config.provider_timeout;
        let harvest = self
            .harvest
            .harvest_provider_with_progress(tenant, provider, reporter);

        let result = match tokio::time::timeout(timeout, harvest).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                url: format!("provider {}", provider.id),
                secs: timeout.as_secs(),
            }),
        };

        match result {
            Ok(outcome) => {
                let stats = outcome.stats();
                reporter.report(HarvestEvent::ProviderCompleted {
                    tenant,
                    provider_id: &provider.id,
                    stats: &stats,
                });
                ProviderHarvestResult::success(provider.id.clone(), provider.label.clone(), outcome)
            }
            Err(e) => {
                let error = e.to_string();
                tracing::warn!(
                    tenant,
                    provider = provider.id.as_str(),
                    kind = %e.kind(),
                    error = %e,
                    "Provider harvest failed"
                );
                reporter.report(HarvestEvent::ProviderFailed {
                    tenant,
                    provider_id: &provider.id,
                    error: &error,
                });
                ProviderHarvestResult::failure(provider.id.clone(), provider.label.clone(), error)
            }
        }
    }
}
