//! Progress reporting for harvest runs.
//!
//! Services emit [`HarvestEvent`]s through a [`ProgressReporter`]; the
//! frontend decides what to do with them. The CLI logs them through
//! `tracing`, tests usually stay silent.

use tracing::{info, warn};

use crate::models::YearMonth;
use crate::stats::{BatchHarvestSummary, HarvestStats, SkipReason};

/// Events emitted while harvesting.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    /// A run over `total_tenants` tenants is starting.
    BatchStarted { total_tenants: usize },
    TenantStarted { tenant: &'a str },
    /// The tenant was abandoned before any provider ran.
    TenantFailed { tenant: &'a str, error: &'a str },
    TenantCompleted {
        tenant: &'a str,
        providers: usize,
        failed_providers: usize,
    },
    ProviderStarted {
        tenant: &'a str,
        provider_id: &'a str,
        provider_label: &'a str,
    },
    ProviderSkipped {
        tenant: &'a str,
        provider_id: &'a str,
        reason: SkipReason,
    },
    /// Months were planned for one report type of a provider.
    MonthsPlanned {
        provider_id: &'a str,
        report: &'a str,
        months: usize,
        already_stored: usize,
    },
    ReportFetched {
        provider_id: &'a str,
        report: &'a str,
        month: YearMonth,
    },
    ReportFailed {
        provider_id: &'a str,
        report: &'a str,
        month: YearMonth,
        error: &'a str,
    },
    ProviderCompleted {
        tenant: &'a str,
        provider_id: &'a str,
        stats: &'a HarvestStats,
    },
    ProviderFailed {
        tenant: &'a str,
        provider_id: &'a str,
        error: &'a str,
    },
    BatchCompleted { summary: &'a BatchHarvestSummary },
}

/// Receiver for [`HarvestEvent`]s.
pub trait ProgressReporter: Send + Sync {
    /// Called when a harvest event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Tracing-based reporter for CLI logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::BatchStarted { total_tenants } => {
                info!(total_tenants, "Starting harvest");
            }
            HarvestEvent::TenantStarted { tenant } => {
                info!(tenant, "Harvesting tenant");
            }
            HarvestEvent::TenantFailed { tenant, error } => {
                warn!(tenant, error, "Tenant skipped");
            }
            HarvestEvent::TenantCompleted {
                tenant,
                providers,
                failed_providers,
            } => {
                info!(tenant, providers, failed_providers, "Tenant completed");
            }
            HarvestEvent::ProviderStarted {
                tenant,
                provider_id,
                provider_label,
            } => {
                info!(tenant, provider = provider_id, label = provider_label, "Harvesting provider");
            }
            HarvestEvent::ProviderSkipped {
                tenant,
                provider_id,
                reason,
            } => {
                info!(tenant, provider = provider_id, %reason, "Provider skipped");
            }
            HarvestEvent::MonthsPlanned {
                provider_id,
                report,
                months,
                already_stored,
            } => {
                tracing::debug!(provider = provider_id, report, months, already_stored, "Months planned");
            }
            HarvestEvent::ReportFetched {
                provider_id,
                report,
                month,
            } => {
                tracing::debug!(provider = provider_id, report, %month, "Report fetched");
            }
            HarvestEvent::ReportFailed {
                provider_id,
                report,
                month,
                error,
            } => {
                warn!(provider = provider_id, report, %month, error, "Report failed");
            }
            HarvestEvent::ProviderCompleted {
                tenant,
                provider_id,
                stats,
            } => {
                info!(
                    tenant,
                    provider = provider_id,
                    fetched = stats.fetched,
                    failed = stats.failed,
                    store_errors = stats.store_errors,
                    already_stored = stats.already_stored,
                    "Provider completed"
                );
            }
            HarvestEvent::ProviderFailed {
                tenant,
                provider_id,
                error,
            } => {
                warn!(tenant, provider = provider_id, error, "Provider failed");
            }
            HarvestEvent::BatchCompleted { summary } => {
                let totals = summary.total_stats();
                info!(
                    tenants = summary.total_tenants(),
                    failed_tenants = summary.failed_tenants(),
                    providers = summary.total_providers(),
                    failed_providers = summary.failed_providers(),
                    fetched = totals.fetched,
                    failed = totals.failed,
                    "Harvest completed"
                );
            }
        }
    }
}
