//! In-memory [`ReportStore`].
//!
//! Used for dry runs and tests. Mutations for one provider are serialized by
//! a per-provider async mutex held across the mutation and the aggregate
//! recomputation, the in-memory equivalent of the row lock taken by the
//! PostgreSQL repository.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use uuid::Uuid;

use crate::aggregate::recompute;
use crate::models::{ProviderAggregates, ReportRecord, YearMonth};
use crate::traits::ReportStore;
use crate::AppError;

#[derive(Default)]
struct State {
    reports: RwLock<HashMap<Uuid, ReportRecord>>,
    aggregates: RwLock<HashMap<String, ProviderAggregates>>,
    provider_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Report store backed by hash maps.
#[derive(Clone, Default)]
pub struct MemoryReportStore {
    state: Arc<State>,
}

fn poisoned<T>(_: PoisonError<T>) -> AppError {
    AppError::Generic("report store lock poisoned".to_string())
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reports across all providers.
    pub fn len(&self) -> usize {
        self.state.reports.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn provider_lock(&self, provider_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, AppError> {
        let mut locks = self.state.provider_locks.lock().map_err(poisoned)?;
        Ok(Arc::clone(locks.entry(provider_id.to_string()).or_default()))
    }

    /// Recomputes and stores the provider's aggregates.
    ///
    /// Callers must hold the provider's lock.
    fn refresh_aggregates(&self, provider_id: &str) -> Result<(), AppError> {
        let summaries: Vec<_> = {
            let reports = self.state.reports.read().map_err(poisoned)?;
            reports
                .values()
                .filter(|r| r.provider_id == provider_id)
                .map(ReportRecord::summary)
                .collect()
        };
        let aggregates = recompute(&summaries);
        self.state
            .aggregates
            .write()
            .map_err(poisoned)?
            .insert(provider_id.to_string(), aggregates);
        Ok(())
    }
}

impl ReportStore for MemoryReportStore {
    async fn upsert(&self, report: &ReportRecord) -> Result<Uuid, AppError> {
        let lock = self.provider_lock(&report.provider_id)?;
        let _guard = lock.lock().await;

        {
            let mut reports = self.state.reports.write().map_err(poisoned)?;
            let mut record = report.clone();
            if let Some(existing) = reports.get(&report.id) {
                record.created_at = existing.created_at;
            }
            reports.insert(report.id, record);
        }
        self.refresh_aggregates(&report.provider_id)?;
        Ok(report.id)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let provider_id = {
            let reports = self.state.reports.read().map_err(poisoned)?;
            match reports.get(&id) {
                Some(r) => r.provider_id.clone(),
                None => return Ok(false),
            }
        };

        let lock = self.provider_lock(&provider_id)?;
        let _guard = lock.lock().await;

        let removed = self
            .state
            .reports
            .write()
            .map_err(poisoned)?
            .remove(&id)
            .is_some();
        if removed {
            self.refresh_aggregates(&provider_id)?;
        }
        Ok(removed)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReportRecord>, AppError> {
        Ok(self.state.reports.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn successful_months(
        &self,
        provider_id: &str,
        report_name: &str,
        release: &str,
    ) -> Result<BTreeSet<YearMonth>, AppError> {
        let reports = self.state.reports.read().map_err(poisoned)?;
        Ok(reports
            .values()
            .filter(|r| {
                r.provider_id == provider_id
                    && r.report_name == report_name
                    && r.release == release
                    && !r.is_failed()
            })
            .map(|r| r.year_month)
            .collect())
    }

    async fn provider_aggregates(
        &self,
        provider_id: &str,
    ) -> Result<Option<ProviderAggregates>, AppError> {
        Ok(self
            .state
            .aggregates
            .read()
            .map_err(poisoned)?
            .get(provider_id)
            .cloned())
    }

    async fn list_for_provider(&self, provider_id: &str) -> Result<Vec<ReportRecord>, AppError> {
        let reports = self.state.reports.read().map_err(poisoned)?;
        let mut list: Vec<ReportRecord> = reports
            .values()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.report_name
                .cmp(&b.report_name)
                .then(a.year_month.cmp(&b.year_month))
        });
        Ok(list)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
