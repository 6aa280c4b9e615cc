//! Harvest service for a single provider.
//!
//! # Architecture
//!
//! The [`HarvestService`] is generic over three traits:
//! - [`ReportStore`] - persistence of report records and aggregates
//! - [`TenantDirectory`] - provider and aggregator lookup
//! - [`AdapterFactory`] - creation of the vendor protocol adapter
//!
//! # Flow
//!
//! 1. Inactive providers are skipped without any request or write.
//! 2. The aggregator, if referenced, is resolved through the directory.
//! 3. The adapter is chosen by service type.
//! 4. For each requested report type the fetch window is planned, leaving out
//!    months that are already stored successfully.
//! 5. All (report type, month) pairs are fetched concurrently, bounded by
//!    [`HarvestConfig::concurrency`]. Every pair ends as either a successful
//!    record or a failed-attempt record; a failing month never stops the
//!    others.
//!
//! Failed months are not retried within a run. Their `failed_attempts`
//! counter grows by one per run until the report is fetched successfully.

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::config::HarvestConfig;
use crate::models::{Aggregator, Provider, ReportRecord, YearMonth, report_id};
use crate::progress::{HarvestEvent, ProgressReporter, SilentReporter};
use crate::stats::{AtomicHarvestStats, MonthOutcome, ProviderHarvestOutcome, SkipReason};
use crate::traits::{AdapterFactory, ReportAdapter, ReportStore, TenantDirectory};
use crate::window::FetchWindow;
use crate::AppError;

/// Service for harvesting the usage reports of one provider.
///
/// # Type Parameters
///
/// * `S` - Report store implementation (e.g., `ReportRepository`)
/// * `D` - Tenant directory implementation (e.g., `HttpTenantDirectory`)
/// * `F` - Protocol adapter factory
///
/// # Example
///
/// ```ignore
/// use tally_core::HarvestService;
///
/// let service = HarvestService::new(repo, directory, AdapterFactoryEnum::new(http)?);
/// let outcome = service.harvest_provider("diku", &provider).await?;
/// println!("fetched {}", outcome.stats().fetched);
/// ```
pub struct HarvestService<S, D, F>
where
    S: ReportStore,
    D: TenantDirectory,
    F: AdapterFactory,
{
    store: S,
    directory: D,
    adapter_factory: F,
    config: HarvestConfig,
}

impl<S, D, F> Clone for HarvestService<S, D, F>
where
    S: ReportStore,
    D: TenantDirectory,
    F: AdapterFactory,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            directory: self.directory.clone(),
            adapter_factory: self.adapter_factory.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, D, F> HarvestService<S, D, F>
where
    S: ReportStore,
    D: TenantDirectory,
    F: AdapterFactory,
{
    /// Creates a new harvest service with default configuration.
    pub fn new(store: S, directory: D, adapter_factory: F) -> Self {
        Self::with_config(store, directory, adapter_factory, HarvestConfig::default())
    }

    /// Creates a harvest service with custom configuration.
    pub fn with_config(store: S, directory: D, adapter_factory: F, config: HarvestConfig) -> Self {
        Self {
            store,
            directory,
            adapter_factory,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Harvests one provider.
    ///
    /// # Errors
    ///
    /// Returns an error only when the provider cannot be harvested at all:
    /// - the aggregator reference has no id ([`AppError::NoAggregator`])
    /// - the aggregator lookup failed ([`AppError::AggregatorLookup`])
    /// - no adapter exists for the service type ([`AppError::UnknownServiceType`])
    /// - the harvesting start is missing ([`AppError::InvalidYearMonth`])
    /// - the store could not be queried for already harvested months
    pub async fn harvest_provider(
        &self,
        tenant: &str,
        provider: &Provider,
    ) -> Result<ProviderHarvestOutcome, AppError> {
        self.harvest_provider_with_progress(tenant, provider, &SilentReporter)
            .await
    }

    /// Looks up a provider in the directory and harvests it.
    pub async fn harvest_provider_by_id(
        &self,
        tenant: &str,
        provider_id: &str,
    ) -> Result<ProviderHarvestOutcome, AppError> {
        let provider = self.directory.get_provider(tenant, provider_id).await?;
        self.harvest_provider(tenant, &provider).await
    }

    /// Same as [`harvest_provider`](Self::harvest_provider), but emits
    /// progress events through the provided reporter.
    pub async fn harvest_provider_with_progress<R: ProgressReporter>(
        &self,
        tenant: &str,
        provider: &Provider,
        reporter: &R,
    ) -> Result<ProviderHarvestOutcome, AppError> {
        if !provider.is_active() {
            tracing::info!(
                tenant,
                provider = provider.id.as_str(),
                status = %provider.harvesting_config.harvesting_status,
                "Harvesting not active, skipping provider"
            );
            reporter.report(HarvestEvent::ProviderSkipped {
                tenant,
                provider_id: &provider.id,
                reason: SkipReason::Inactive,
            });
            return Ok(ProviderHarvestOutcome::Skipped(SkipReason::Inactive));
        }

        let aggregator = self.resolve_aggregator(tenant, provider).await?;
        let adapter = self.adapter_factory.create(provider, aggregator.as_ref())?;

        let start = provider
            .harvesting_config
            .harvesting_start
            .ok_or_else(|| AppError::InvalidYearMonth(String::new()))?;
        let end = provider.harvesting_config.harvesting_end;
        let current = self.config.current_month();
        let release = adapter.release().to_string();

        let stats = AtomicHarvestStats::new();
        let mut jobs: Vec<(String, YearMonth)> = Vec::new();

        for report in provider.requested_reports() {
            let stored = self
                .store
                .successful_months(&provider.id, &report, &release)
                .await?;
            let window = FetchWindow::plan(start, end, current, &stored);

            reporter.report(HarvestEvent::MonthsPlanned {
                provider_id: &provider.id,
                report: &report,
                months: window.len(),
                already_stored: window.skipped(),
            });
            stats.add_already_stored(window.skipped());

            jobs.extend(window.into_iter().map(|month| (report.clone(), month)));
        }

        tracing::info!(
            tenant,
            provider = provider.id.as_str(),
            service_type = adapter.service_type(),
            release = release.as_str(),
            months = jobs.len(),
            "Harvesting provider"
        );

        stream::iter(jobs.iter())
            .map(|(report, month)| self.harvest_month(&adapter, &provider.id, report, *month, reporter))
            .buffer_unordered(self.config.concurrency.max(1))
            .for_each(|outcome| {
                stats.record(outcome);
                async {}
            })
            .await;

        Ok(ProviderHarvestOutcome::Harvested(stats.to_stats()))
    }

    /// Resolves the aggregator a provider harvests through, if any.
    async fn resolve_aggregator(
        &self,
        tenant: &str,
        provider: &Provider,
    ) -> Result<Option<Aggregator>, AppError> {
        let Some(reference) = provider.aggregator() else {
            return Ok(None);
        };

        let id = match reference.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => return Err(AppError::NoAggregator(provider.id.clone())),
        };

        self.directory
            .get_aggregator(tenant, id)
            .await
            .map(Some)
            .map_err(|e| AppError::AggregatorLookup {
                id: id.to_string(),
                source: Box::new(e),
            })
    }

    /// Fetches and stores one report month.
    async fn harvest_month<R: ProgressReporter>(
        &self,
        adapter: &F::Adapter,
        provider_id: &str,
        report: &str,
        month: YearMonth,
        reporter: &R,
    ) -> MonthOutcome {
        let release = adapter.release();

        let (record, outcome) = match adapter.fetch(report, month, month).await {
            Ok(body) => {
                reporter.report(HarvestEvent::ReportFetched {
                    provider_id,
                    report,
                    month,
                });
                let record =
                    ReportRecord::success(provider_id, report, release, month, body, Utc::now());
                (record, MonthOutcome::Fetched)
            }
            Err(e) => {
                let reason = e.to_string();
                reporter.report(HarvestEvent::ReportFailed {
                    provider_id,
                    report,
                    month,
                    error: &reason,
                });

                let id = report_id(provider_id, report, release, month);
                let previous = match self.store.get(id).await {
                    Ok(existing) => existing.and_then(|r| r.failed_attempts),
                    Err(store_err) => {
                        tracing::warn!(
                            provider = provider_id,
                            report,
                            %month,
                            error = %store_err,
                            "Failed to read previous attempt"
                        );
                        return MonthOutcome::StoreError;
                    }
                };

                let record = ReportRecord::failure(
                    provider_id,
                    report,
                    release,
                    month,
                    reason,
                    previous,
                    Utc::now(),
                );
                (record, MonthOutcome::Failed)
            }
        };

        match self.store.upsert(&record).await {
            Ok(_) => outcome,
            Err(e) => {
                tracing::warn!(
                    provider = provider_id,
                    report,
                    %month,
                    error = %e,
                    "Failed to store report"
                );
                MonthOutcome::StoreError
            }
        }
    }
}
