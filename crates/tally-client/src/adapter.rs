//! Adapter factory and enum dispatch.
//!
//! This module provides a unified interface over the vendor protocols
//! through the [`ReportAdapterEnum`] enum.
//!
//! # Why an Enum Instead of `dyn Trait`?
//!
//! The [`ReportAdapter`] trait uses `impl Future` return types (RPITIT),
//! making it not object-safe. We use an enum for static dispatch; adding a
//! protocol means adding a variant here, the executor stays untouched.

use tally_core::error::AppError;
use tally_core::models::{Aggregator, Provider, YearMonth};
use tally_core::traits::{AdapterFactory, FetchRequest, ReportAdapter};
use tally_core::HttpConfig;

use crate::account::SushiAccount;
use crate::cs41::Cs41Adapter;
use crate::cs50::Cs50Adapter;
use crate::http::HttpClient;
use crate::nss::NssAdapter;

/// Unified adapter that wraps the concrete protocol implementations.
#[derive(Clone)]
pub enum ReportAdapterEnum {
    Nss(NssAdapter),
    Cs41(Cs41Adapter),
    Cs50(Cs50Adapter),
}

impl ReportAdapter for ReportAdapterEnum {
    fn service_type(&self) -> &'static str {
        match self {
            Self::Nss(a) => a.service_type(),
            Self::Cs41(a) => a.service_type(),
            Self::Cs50(a) => a.service_type(),
        }
    }

    fn release(&self) -> &str {
        match self {
            Self::Nss(a) => a.release(),
            Self::Cs41(a) => a.release(),
            Self::Cs50(a) => a.release(),
        }
    }

    fn build_request(
        &self,
        report: &str,
        begin: YearMonth,
        end: YearMonth,
    ) -> Result<FetchRequest, AppError> {
        match self {
            Self::Nss(a) => a.build_request(report, begin, end),
            Self::Cs41(a) => a.build_request(report, begin, end),
            Self::Cs50(a) => a.build_request(report, begin, end),
        }
    }

    fn is_valid_report(&self, raw_body: &str) -> bool {
        match self {
            Self::Nss(a) => a.is_valid_report(raw_body),
            Self::Cs41(a) => a.is_valid_report(raw_body),
            Self::Cs50(a) => a.is_valid_report(raw_body),
        }
    }

    async fn fetch(&self, report: &str, begin: YearMonth, end: YearMonth) -> Result<String, AppError> {
        match self {
            Self::Nss(a) => a.fetch(report, begin, end).await,
            Self::Cs41(a) => a.fetch(report, begin, end).await,
            Self::Cs50(a) => a.fetch(report, begin, end).await,
        }
    }
}

/// Factory that creates the adapter matching a provider's service type.
///
/// The aggregator's service type wins when the provider harvests through
/// one. Matching is case-insensitive.
#[derive(Clone)]
pub struct AdapterFactoryEnum {
    http: HttpClient,
}

impl AdapterFactoryEnum {
    pub fn new(config: &HttpConfig) -> Result<Self, AppError> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }
}

impl AdapterFactory for AdapterFactoryEnum {
    type Adapter = ReportAdapterEnum;

    fn create(
        &self,
        provider: &Provider,
        aggregator: Option<&Aggregator>,
    ) -> Result<Self::Adapter, AppError> {
        let service_type = match aggregator {
            Some(a) => a.service_type.trim(),
            None => provider.service_type().unwrap_or_default().trim(),
        };

        let http = self.http.clone();
        let account = |default_release| SushiAccount::resolve(provider, aggregator, default_release);

        if service_type.eq_ignore_ascii_case(NssAdapter::SERVICE_TYPE) {
            Ok(ReportAdapterEnum::Nss(NssAdapter::new(http, account(NssAdapter::DEFAULT_RELEASE)?)))
        } else if service_type.eq_ignore_ascii_case(Cs41Adapter::SERVICE_TYPE) {
            Ok(ReportAdapterEnum::Cs41(Cs41Adapter::new(http, account(Cs41Adapter::DEFAULT_RELEASE)?)))
        } else if service_type.eq_ignore_ascii_case(Cs50Adapter::SERVICE_TYPE) {
            Ok(ReportAdapterEnum::Cs50(Cs50Adapter::new(http, account(Cs50Adapter::DEFAULT_RELEASE)?)))
        } else {
            tracing::warn!(
                provider = provider.id.as_str(),
                service_type,
                "No service implementation available"
            );
            Err(AppError::UnknownServiceType(service_type.to_string()))
        }
    }
}
