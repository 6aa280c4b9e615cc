//! HTTP client for the platform gateway's tenant and provider directory.
//!
//! # Endpoints
//!
//! - `GET /_/proxy/tenants`: tenant ids
//! - `GET /_/proxy/tenants/{tenant}/modules/{module}`: module enablement
//! - `GET /usage-data-providers?limit=N&offset=0`: providers (first page)
//! - `GET /usage-data-providers/{id}`: one provider
//! - `GET /aggregator-settings/{id}`: aggregator settings
//!
//! Tenant-scoped calls carry `X-Okapi-Tenant`; `X-Okapi-Token` is sent when
//! a token is configured.

use reqwest::Url;
use serde::Deserialize;
use tally_core::config::PathsConfig;
use tally_core::error::AppError;
use tally_core::models::{Aggregator, Provider};
use tally_core::traits::TenantDirectory;
use tally_core::HarvesterConfig;

use crate::http::{HttpClient, parse_url};

const TENANT_HEADER: &str = "X-Okapi-Tenant";
const TOKEN_HEADER: &str = "X-Okapi-Token";

/// An entry of the tenant listing. Gateways answer with objects; plain
/// strings are accepted as well.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TenantEntry {
    Object { id: String },
    Id(String),
}

impl TenantEntry {
    fn into_id(self) -> String {
        match self {
            TenantEntry::Object { id } | TenantEntry::Id(id) => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModuleDescriptor {
    #[serde(default)]
    id: String,
}

/// One page of the provider listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderPage {
    #[serde(default)]
    usage_data_providers: Vec<Provider>,
    #[serde(default)]
    total_records: Option<usize>,
}

/// [`TenantDirectory`] over the gateway's HTTP interface.
#[derive(Clone)]
pub struct HttpTenantDirectory {
    http: HttpClient,
    base_url: Url,
    module_id: String,
    token: Option<String>,
    paths: PathsConfig,
}

impl HttpTenantDirectory {
    /// Creates a directory client from the harvester configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if `okapi_url` is not a valid URL, or
    /// `AppError::ConfigError` if the HTTP client cannot be built.
    pub fn new(config: &HarvesterConfig) -> Result<Self, AppError> {
        let http = HttpClient::new(&config.http)?;
        Self::with_client(http, config)
    }

    pub fn with_client(http: HttpClient, config: &HarvesterConfig) -> Result<Self, AppError> {
        let base_url = parse_url(&config.okapi_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidUrl(config.okapi_url.clone()));
        }

        Ok(Self {
            http,
            base_url,
            module_id: config.module_id.clone(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            paths: config.paths.clone(),
        })
    }

    /// Joins path segments onto the gateway URL, percent-encoding each.
    fn url(&self, path: &str, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| AppError::InvalidUrl(self.base_url.to_string()))?;
            parts.pop_if_empty();
            parts.extend(path.split('/').filter(|s| !s.is_empty()));
            parts.extend(segments);
        }
        Ok(url)
    }

    fn headers(&self, tenant: Option<&str>) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(2);
        if let Some(tenant) = tenant {
            headers.push((TENANT_HEADER.to_string(), tenant.to_string()));
        }
        if let Some(token) = &self.token {
            headers.push((TOKEN_HEADER.to_string(), token.clone()));
        }
        headers
    }

    fn providers_url(&self) -> Result<Url, AppError> {
        let mut url = self.url(&self.paths.providers, &[])?;
        url.query_pairs_mut()
            .append_pair("limit", &self.paths.provider_page_size.to_string())
            .append_pair("offset", "0");
        Ok(url)
    }
}

fn is_not_found(err: &AppError) -> bool {
    matches!(err, AppError::Transport { status: Some(404), .. })
}

fn tenant_ids(entries: Vec<TenantEntry>) -> Result<Vec<String>, AppError> {
    let ids: Vec<String> = entries
        .into_iter()
        .map(TenantEntry::into_id)
        .filter(|id| !id.trim().is_empty())
        .collect();
    if ids.is_empty() {
        return Err(AppError::NoTenants);
    }
    Ok(ids)
}

impl TenantDirectory for HttpTenantDirectory {
    async fn list_tenants(&self) -> Result<Vec<String>, AppError> {
        let url = self.url(&self.paths.tenants, &[])?;
        let entries: Vec<TenantEntry> = self.http.get_json(&url, &self.headers(None)).await?;
        let ids = tenant_ids(entries)?;
        tracing::info!(count = ids.len(), "Found tenants");
        Ok(ids)
    }

    async fn check_module_enabled(&self, tenant: &str) -> Result<(), AppError> {
        let not_enabled = || AppError::ModuleNotEnabled {
            tenant: tenant.to_string(),
            module: self.module_id.clone(),
        };

        let url = self.url(&self.paths.tenants, &[tenant, "modules", self.module_id.as_str()])?;
        match self
            .http
            .get_json::<ModuleDescriptor>(&url, &self.headers(None))
            .await
        {
            Ok(module) if module.id == self.module_id => Ok(()),
            Ok(_) => Err(not_enabled()),
            Err(e) if is_not_found(&e) => Err(not_enabled()),
            Err(e) => Err(e),
        }
    }

    async fn list_providers(&self, tenant: &str) -> Result<Vec<Provider>, AppError> {
        let url = self.providers_url()?;
        let page: ProviderPage = self.http.get_json(&url, &self.headers(Some(tenant))).await?;

        let returned = page.usage_data_providers.len();
        match page.total_records {
            Some(total) if total > returned => {
                tracing::warn!(
                    tenant,
                    total,
                    returned,
                    "Provider listing truncated to the first page"
                );
            }
            _ => {}
        }
        Ok(page.usage_data_providers)
    }

    async fn get_provider(&self, tenant: &str, provider_id: &str) -> Result<Provider, AppError> {
        let url = self.url(&self.paths.providers, &[provider_id])?;
        self.http
            .get_json(&url, &self.headers(Some(tenant)))
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    AppError::ProviderNotFound(provider_id.to_string())
                } else {
                    e
                }
            })
    }

    async fn get_aggregator(&self, tenant: &str, aggregator_id: &str) -> Result<Aggregator, AppError> {
        let url = self.url(&self.paths.aggregators, &[aggregator_id])?;
        self.http.get_json(&url, &self.headers(Some(tenant))).await
    }
}
