//! Trait definitions for external dependencies.
//!
//! This module defines traits that abstract over the harvester's
//! collaborators (SUSHI services, the tenant directory, the report store),
//! enabling:
//!
//! - **Testability**: Mock implementations for unit testing
//! - **Flexibility**: New vendor protocols without touching the executor
//! - **Decoupling**: Core business logic doesn't depend on HTTP or SQL
//!
//! # Example
//!
//! ```
//! use tally_core::traits::{ReportAdapter, ReportStore};
//! use tally_core::{AppError, ReportRecord, YearMonth};
//!
//! // Business logic uses traits, not concrete types
//! async fn harvest_month<A, S>(
//!     adapter: &A,
//!     store: &S,
//!     provider_id: &str,
//!     report: &str,
//!     month: YearMonth,
//! ) -> Result<(), AppError>
//! where
//!     A: ReportAdapter,
//!     S: ReportStore,
//! {
//!     let body = adapter.fetch(report, month, month).await?;
//!     let record = ReportRecord::success(
//!         provider_id,
//!         report,
//!         adapter.release(),
//!         month,
//!         body,
//!         chrono::Utc::now(),
//!     );
//!     store.upsert(&record).await?;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use uuid::Uuid;

use crate::models::{Aggregator, Provider, ProviderAggregates, ReportRecord, YearMonth};
use crate::AppError;

/// HTTP method of a [`FetchRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Fully-qualified description of one report request.
///
/// Built without I/O by [`ReportAdapter::build_request`] and executed by the
/// adapter's `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    /// Absolute URL including all query parameters.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Vendor-specific SUSHI protocol.
///
/// One implementation per `serviceType`. Implementations are bound to a single
/// provider (and its aggregator, if any) at construction time.
pub trait ReportAdapter: Send + Sync {
    /// The service type tag this adapter handles (e.g. `"cs50"`).
    fn service_type(&self) -> &'static str;

    /// The COUNTER release of the reports this adapter fetches.
    fn release(&self) -> &str;

    /// Builds the request for `report` covering `begin` through `end`.
    ///
    /// Pure function of the bound credentials and the arguments.
    fn build_request(
        &self,
        report: &str,
        begin: YearMonth,
        end: YearMonth,
    ) -> Result<FetchRequest, AppError>;

    /// Returns false if the body is a vendor error payload rather than a report.
    fn is_valid_report(&self, raw_body: &str) -> bool;

    /// Fetches a report body.
    ///
    /// Transport problems resolve to [`AppError::Transport`] or
    /// [`AppError::Timeout`], unreadable bodies to [`AppError::Decode`], and
    /// bodies rejected by [`is_valid_report`](Self::is_valid_report) to
    /// [`AppError::ReportNotValid`].
    fn fetch(
        &self,
        report: &str,
        begin: YearMonth,
        end: YearMonth,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Factory for protocol adapters.
///
/// Separate from `ReportAdapter` so the adapter can be chosen at runtime from
/// a service type string.
pub trait AdapterFactory: Send + Sync + Clone {
    /// The type of adapter this factory creates.
    type Adapter: ReportAdapter;

    /// Creates the adapter for a provider.
    ///
    /// When `aggregator` is present its service type and settings win over
    /// the provider's own. Unknown service types yield
    /// [`AppError::UnknownServiceType`].
    fn create(
        &self,
        provider: &Provider,
        aggregator: Option<&Aggregator>,
    ) -> Result<Self::Adapter, AppError>;
}

/// Directory of tenants, providers and aggregators.
///
/// Implemented over HTTP against the platform's gateway; everything the
/// harvester knows about tenants and providers comes through here.
pub trait TenantDirectory: Send + Sync + Clone {
    /// Lists tenant ids. An empty list is [`AppError::NoTenants`].
    fn list_tenants(&self) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Fails with [`AppError::ModuleNotEnabled`] unless the harvesting module
    /// is enabled for `tenant`.
    fn check_module_enabled(
        &self,
        tenant: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Lists the tenant's providers (first page only).
    fn list_providers(
        &self,
        tenant: &str,
    ) -> impl Future<Output = Result<Vec<Provider>, AppError>> + Send;

    /// Fetches one provider by id.
    fn get_provider(
        &self,
        tenant: &str,
        provider_id: &str,
    ) -> impl Future<Output = Result<Provider, AppError>> + Send;

    /// Fetches aggregator settings by id.
    fn get_aggregator(
        &self,
        tenant: &str,
        aggregator_id: &str,
    ) -> impl Future<Output = Result<Aggregator, AppError>> + Send;
}

/// Store for harvested reports and the provider aggregates derived from them.
///
/// `upsert` and `delete` are the only mutations. Both recompute the
/// provider's [`ProviderAggregates`] atomically with the mutation, so
/// concurrent writers for one provider never leave a torn aggregate.
pub trait ReportStore: Send + Sync + Clone {
    /// Inserts or replaces the report with `report.id`.
    ///
    /// # Returns
    ///
    /// The id of the stored report.
    fn upsert(&self, report: &ReportRecord) -> impl Future<Output = Result<Uuid, AppError>> + Send;

    /// Deletes a report.
    ///
    /// # Returns
    ///
    /// `true` if a report was deleted, `false` if the id was unknown.
    fn delete(&self, id: Uuid) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Retrieves a report by id.
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<ReportRecord>, AppError>> + Send;

    /// Months for which a report without failed attempts is stored.
    fn successful_months(
        &self,
        provider_id: &str,
        report_name: &str,
        release: &str,
    ) -> impl Future<Output = Result<BTreeSet<YearMonth>, AppError>> + Send;

    /// Current aggregates, or `None` if the provider has never had a report.
    fn provider_aggregates(
        &self,
        provider_id: &str,
    ) -> impl Future<Output = Result<Option<ProviderAggregates>, AppError>> + Send;

    /// All reports of a provider, ordered by report name and month.
    fn list_for_provider(
        &self,
        provider_id: &str,
    ) -> impl Future<Output = Result<Vec<ReportRecord>, AppError>> + Send;

    /// Checks that the store is reachable.
    fn health_check(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}
