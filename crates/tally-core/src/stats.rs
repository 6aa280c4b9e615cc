//! Harvest statistics and batch result types.
//!
//! Pure bookkeeping, decoupled from I/O: the executor records one
//! [`MonthOutcome`] per (report type, month) pair, the orchestrator collects
//! per-provider and per-tenant results into a [`BatchHarvestSummary`].

use std::sync::atomic::{AtomicUsize, Ordering};

/// Outcome of harvesting one report type for one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthOutcome {
    /// Report fetched and stored.
    Fetched,
    /// Fetch failed; a failed-attempt record was stored.
    Failed,
    /// The store rejected the write. Nothing was recorded for this month.
    StoreError,
}

/// Statistics for harvesting one provider.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub fetched: usize,
    pub failed: usize,
    pub store_errors: usize,
    /// Months skipped because a successful report was already stored.
    pub already_stored: usize,
}

impl HarvestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: MonthOutcome) {
        match outcome {
            MonthOutcome::Fetched => self.fetched += 1,
            MonthOutcome::Failed => self.failed += 1,
            MonthOutcome::StoreError => self.store_errors += 1,
        }
    }

    /// Number of months for which a request was made.
    pub fn attempted(&self) -> usize {
        self.fetched + self.failed + self.store_errors
    }

    /// Adds another provider's counters to these.
    pub fn merge(&mut self, other: &HarvestStats) {
        self.fetched += other.fetched;
        self.failed += other.failed;
        self.store_errors += other.store_errors;
        self.already_stored += other.already_stored;
    }
}

/// Thread-safe counterpart of [`HarvestStats`] for the concurrent month stream.
#[derive(Debug, Default)]
pub struct AtomicHarvestStats {
    fetched: AtomicUsize,
    failed: AtomicUsize,
    store_errors: AtomicUsize,
    already_stored: AtomicUsize,
}

impl AtomicHarvestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: MonthOutcome) {
        let counter = match outcome {
            MonthOutcome::Fetched => &self.fetched,
            MonthOutcome::Failed => &self.failed,
            MonthOutcome::StoreError => &self.store_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_already_stored(&self, count: usize) {
        self.already_stored.fetch_add(count, Ordering::Relaxed);
    }

    /// Snapshot of the current counters.
    pub fn to_stats(&self) -> HarvestStats {
        HarvestStats {
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            already_stored: self.already_stored.load(Ordering::Relaxed),
        }
    }
}

/// Why a provider was left out of a run without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Harvesting status is not active.
    Inactive,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Inactive => write!(f, "harvesting inactive"),
        }
    }
}

/// Result of [`HarvestService::harvest_provider`](crate::HarvestService::harvest_provider).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderHarvestOutcome {
    Harvested(HarvestStats),
    Skipped(SkipReason),
}

impl ProviderHarvestOutcome {
    /// The counters of a harvested provider, zero for a skipped one.
    pub fn stats(&self) -> HarvestStats {
        match self {
            ProviderHarvestOutcome::Harvested(stats) => stats.clone(),
            ProviderHarvestOutcome::Skipped(_) => HarvestStats::default(),
        }
    }
}

/// Result of harvesting a single provider within a tenant.
#[derive(Debug, Clone)]
pub struct ProviderHarvestResult {
    pub provider_id: String,
    pub provider_label: String,
    pub outcome: Result<ProviderHarvestOutcome, String>,
}

impl ProviderHarvestResult {
    pub fn success(provider_id: String, provider_label: String, outcome: ProviderHarvestOutcome) -> Self {
        Self {
            provider_id,
            provider_label,
            outcome: Ok(outcome),
        }
    }

    pub fn failure(provider_id: String, provider_label: String, error: String) -> Self {
        Self {
            provider_id,
            provider_label,
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.outcome.as_ref().err().map(String::as_str)
    }
}

/// Result of harvesting one tenant.
#[derive(Debug, Clone)]
pub struct TenantHarvestResult {
    pub tenant: String,
    /// Set when the tenant was abandoned before any provider ran
    /// (module not enabled, provider listing failed).
    pub error: Option<String>,
    pub providers: Vec<ProviderHarvestResult>,
}

impl TenantHarvestResult {
    pub fn completed(tenant: String, providers: Vec<ProviderHarvestResult>) -> Self {
        Self {
            tenant,
            error: None,
            providers,
        }
    }

    pub fn failed(tenant: String, error: String) -> Self {
        Self {
            tenant,
            error: Some(error),
            providers: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed_providers(&self) -> usize {
        self.providers.iter().filter(|p| !p.is_success()).count()
    }
}

/// Summary of a harvest across tenants.
#[derive(Debug, Clone, Default)]
pub struct BatchHarvestSummary {
    pub tenants: Vec<TenantHarvestResult>,
}

impl BatchHarvestSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: TenantHarvestResult) {
        self.tenants.push(result);
    }

    pub fn total_tenants(&self) -> usize {
        self.tenants.len()
    }

    pub fn failed_tenants(&self) -> usize {
        self.tenants.iter().filter(|t| !t.is_success()).count()
    }

    pub fn total_providers(&self) -> usize {
        self.tenants.iter().map(|t| t.providers.len()).sum()
    }

    pub fn failed_providers(&self) -> usize {
        self.tenants.iter().map(TenantHarvestResult::failed_providers).sum()
    }

    /// Counters summed over every successfully harvested provider.
    pub fn total_stats(&self) -> HarvestStats {
        let mut total = HarvestStats::new();
        for provider in self.tenants.iter().flat_map(|t| &t.providers) {
            if let Ok(outcome) = &provider.outcome {
                total.merge(&outcome.stats());
            }
        }
        total
    }
}
