//! Test utilities and mock implementations for integration tests.
//!
//! Provides mock implementations of the core traits for testing
//! `HarvestService` and `Orchestrator` in isolation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tally_core::traits::{AdapterFactory, FetchRequest, ReportAdapter, TenantDirectory};
use tally_core::{AppError, Aggregator, Provider, YearMonth};

pub const MOCK_SERVICE_TYPE: &str = "mock";

// =============================================================================
// Provider builders
// =============================================================================

pub fn ym(s: &str) -> YearMonth {
    s.parse().unwrap()
}

/// An active provider harvested directly through the mock service type.
pub fn active_provider(id: &str, reports: &[&str], start: &str) -> Provider {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "label": format!("Provider {}", id),
        "harvestingConfig": {
            "harvestingStatus": "active",
            "requestedReports": reports,
            "harvestingStart": start,
            "reportRelease": 5,
            "sushiConfig": { "serviceType": MOCK_SERVICE_TYPE, "serviceUrl": "https://sushi.example.com" }
        },
        "sushiCredentials": { "customerId": "cust", "requestorId": "req", "apiKey": "key" }
    }))
    .unwrap()
}

pub fn inactive_provider(id: &str, reports: &[&str], start: &str) -> Provider {
    let mut provider = active_provider(id, reports, start);
    provider.harvesting_config.harvesting_status = tally_core::HarvestingStatus::Inactive;
    provider
}

/// An active provider that references an aggregator.
pub fn aggregated_provider(id: &str, aggregator_id: Option<&str>, reports: &[&str], start: &str) -> Provider {
    let mut provider = active_provider(id, reports, start);
    provider.harvesting_config.sushi_config = None;
    provider.harvesting_config.aggregator = Some(tally_core::AggregatorRef {
        id: aggregator_id.map(str::to_string),
        name: Some("Aggregator".to_string()),
        vendor_code: Some("VND".to_string()),
    });
    provider
}

pub fn mock_aggregator(id: &str) -> Aggregator {
    Aggregator {
        id: id.to_string(),
        label: "Mock aggregator".to_string(),
        service_type: MOCK_SERVICE_TYPE.to_string(),
        service_url: "https://aggregator.example.com".to_string(),
        aggregator_config: Default::default(),
    }
}

// =============================================================================
// MockAdapter
// =============================================================================

/// Scripted response of the mock SUSHI service.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// A valid report body.
    Report(String),
    /// A 200 response carrying a vendor error payload.
    Exception(String),
    /// A non-2xx status.
    Status(u16),
}

#[derive(Default)]
struct MockService {
    responses: Mutex<HashMap<(String, String, YearMonth), MockResponse>>,
    fetches: AtomicUsize,
    created_for: Mutex<Vec<String>>,
}

/// Mock protocol adapter bound to one provider.
///
/// Unscripted months return a small JSON report.
pub struct MockAdapter {
    provider_id: String,
    release: String,
    service: Arc<MockService>,
}

impl ReportAdapter for MockAdapter {
    fn service_type(&self) -> &'static str {
        MOCK_SERVICE_TYPE
    }

    fn release(&self) -> &str {
        &self.release
    }

    fn build_request(
        &self,
        report: &str,
        begin: YearMonth,
        end: YearMonth,
    ) -> Result<FetchRequest, AppError> {
        Ok(FetchRequest::get(format!(
            "https://sushi.example.com/{}/{}?begin={}&end={}",
            self.provider_id, report, begin, end
        )))
    }

    fn is_valid_report(&self, raw_body: &str) -> bool {
        !raw_body.contains("Exception")
    }

    async fn fetch(&self, report: &str, begin: YearMonth, end: YearMonth) -> Result<String, AppError> {
        self.service.fetches.fetch_add(1, Ordering::SeqCst);
        let request = self.build_request(report, begin, end)?;

        let response = self
            .service
            .responses
            .lock()
            .unwrap()
            .get(&(self.provider_id.clone(), report.to_string(), begin))
            .cloned();

        match response {
            None => Ok(format!(r#"{{"Report_Header":{{"Report_ID":"{}"}},"Report_Items":[]}}"#, report)),
            Some(MockResponse::Report(body)) => Ok(body),
            Some(MockResponse::Exception(body)) => {
                if self.is_valid_report(&body) {
                    Ok(body)
                } else {
                    Err(AppError::ReportNotValid(body))
                }
            }
            Some(MockResponse::Status(code)) => Err(AppError::Transport {
                url: request.url,
                status: Some(code),
                message: "mock failure".to_string(),
            }),
        }
    }
}

/// Factory for mock adapters, sharing one scripted service.
#[derive(Clone, Default)]
pub struct MockAdapterFactory {
    service: Arc<MockService>,
}

impl MockAdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response for one provider, report and month.
    pub fn respond(&self, provider_id: &str, report: &str, month: YearMonth, response: MockResponse) {
        self.service
            .responses
            .lock()
            .unwrap()
            .insert((provider_id.to_string(), report.to_string(), month), response);
    }

    /// Total number of fetches across all adapters.
    pub fn fetch_count(&self) -> usize {
        self.service.fetches.load(Ordering::SeqCst)
    }

    /// Provider ids adapters were created for.
    pub fn created_for(&self) -> Vec<String> {
        self.service.created_for.lock().unwrap().clone()
    }
}

impl AdapterFactory for MockAdapterFactory {
    type Adapter = MockAdapter;

    fn create(&self, provider: &Provider, aggregator: Option<&Aggregator>) -> Result<MockAdapter, AppError> {
        let service_type = match aggregator {
            Some(a) => a.service_type.clone(),
            None => provider.service_type().unwrap_or_default().to_string(),
        };
        if !service_type.eq_ignore_ascii_case(MOCK_SERVICE_TYPE) {
            return Err(AppError::UnknownServiceType(service_type));
        }

        self.service.created_for.lock().unwrap().push(provider.id.clone());
        Ok(MockAdapter {
            provider_id: provider.id.clone(),
            release: provider
                .harvesting_config
                .report_release
                .clone()
                .unwrap_or_else(|| "5".to_string()),
            service: Arc::clone(&self.service),
        })
    }
}

// =============================================================================
// MockDirectory
// =============================================================================

#[derive(Default)]
struct DirectoryState {
    tenants: Vec<String>,
    disabled: HashSet<String>,
    providers: HashMap<String, Vec<Provider>>,
    aggregators: HashMap<String, Aggregator>,
    fail_tenant_listing: bool,
}

/// In-memory tenant directory.
#[derive(Clone, Default)]
pub struct MockDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(self, tenant: &str, providers: Vec<Provider>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.tenants.push(tenant.to_string());
            state.providers.insert(tenant.to_string(), providers);
        }
        self
    }

    /// Marks the harvesting module as not enabled for `tenant`.
    pub fn with_module_disabled(self, tenant: &str) -> Self {
        self.state.lock().unwrap().disabled.insert(tenant.to_string());
        self
    }

    pub fn with_aggregator(self, aggregator: Aggregator) -> Self {
        self.state
            .lock()
            .unwrap()
            .aggregators
            .insert(aggregator.id.clone(), aggregator);
        self
    }

    pub fn with_failing_tenant_listing(self) -> Self {
        self.state.lock().unwrap().fail_tenant_listing = true;
        self
    }
}

impl TenantDirectory for MockDirectory {
    async fn list_tenants(&self) -> Result<Vec<String>, AppError> {
        let state = self.state.lock().unwrap();
        if state.fail_tenant_listing {
            return Err(AppError::Transport {
                url: "http://okapi/_/proxy/tenants".to_string(),
                status: None,
                message: "connection refused".to_string(),
            });
        }
        if state.tenants.is_empty() {
            return Err(AppError::NoTenants);
        }
        Ok(state.tenants.clone())
    }

    async fn check_module_enabled(&self, tenant: &str) -> Result<(), AppError> {
        if self.state.lock().unwrap().disabled.contains(tenant) {
            return Err(AppError::ModuleNotEnabled {
                tenant: tenant.to_string(),
                module: "mod-erm-usage-harvester".to_string(),
            });
        }
        Ok(())
    }

    async fn list_providers(&self, tenant: &str) -> Result<Vec<Provider>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .providers
            .get(tenant)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_provider(&self, tenant: &str, provider_id: &str) -> Result<Provider, AppError> {
        self.state
            .lock()
            .unwrap()
            .providers
            .get(tenant)
            .and_then(|ps| ps.iter().find(|p| p.id == provider_id).cloned())
            .ok_or_else(|| AppError::ProviderNotFound(provider_id.to_string()))
    }

    async fn get_aggregator(&self, _tenant: &str, aggregator_id: &str) -> Result<Aggregator, AppError> {
        self.state
            .lock()
            .unwrap()
            .aggregators
            .get(aggregator_id)
            .cloned()
            .ok_or_else(|| AppError::Transport {
                url: format!("http://okapi/aggregator-settings/{}", aggregator_id),
                status: Some(404),
                message: "Not Found".to_string(),
            })
    }
}
