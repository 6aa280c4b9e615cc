//! Resolved SUSHI connection settings.

use tally_core::error::AppError;
use tally_core::models::{Aggregator, Provider};

/// Endpoint and credentials an adapter presents to a SUSHI service.
///
/// Built from the provider alone, or from the provider plus the aggregator it
/// harvests through. Aggregator settings take precedence; provider
/// credentials fill the gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SushiAccount {
    pub service_url: String,
    pub api_key: Option<String>,
    pub requestor_id: Option<String>,
    pub requestor_name: Option<String>,
    pub requestor_mail: Option<String>,
    pub customer_id: Option<String>,
    pub platform: Option<String>,
    pub release: String,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string)
}

impl SushiAccount {
    /// Resolves the account for `provider`.
    ///
    /// `default_release` applies when neither the provider nor the aggregator
    /// names a release.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if no service URL is configured.
    pub fn resolve(
        provider: &Provider,
        aggregator: Option<&Aggregator>,
        default_release: &str,
    ) -> Result<Self, AppError> {
        let creds = &provider.sushi_credentials;
        let provider_release = non_empty(provider.harvesting_config.report_release.as_ref());

        let account = match aggregator {
            None => Self {
                service_url: provider.service_url().unwrap_or_default().trim().to_string(),
                api_key: non_empty(creds.api_key.as_ref()),
                requestor_id: non_empty(creds.requestor_id.as_ref()),
                requestor_name: non_empty(creds.requestor_name.as_ref()),
                requestor_mail: non_empty(creds.requestor_mail.as_ref()),
                customer_id: non_empty(creds.customer_id.as_ref()),
                platform: non_empty(creds.platform.as_ref()),
                release: provider_release.unwrap_or_else(|| default_release.to_string()),
            },
            Some(aggregator) => {
                let config = &aggregator.aggregator_config;
                let vendor_code = provider
                    .aggregator()
                    .and_then(|r| non_empty(r.vendor_code.as_ref()))
                    .or_else(|| non_empty(config.vendor_code.as_ref()))
                    .or_else(|| non_empty(creds.platform.as_ref()));
                Self {
                    service_url: aggregator.service_url.trim().to_string(),
                    api_key: non_empty(config.api_key.as_ref())
                        .or_else(|| non_empty(creds.api_key.as_ref())),
                    requestor_id: non_empty(config.requestor_id.as_ref())
                        .or_else(|| non_empty(creds.requestor_id.as_ref())),
                    requestor_name: non_empty(creds.requestor_name.as_ref()),
                    requestor_mail: non_empty(creds.requestor_mail.as_ref()),
                    customer_id: non_empty(creds.customer_id.as_ref())
                        .or_else(|| non_empty(config.customer_id.as_ref())),
                    platform: vendor_code,
                    release: provider_release
                        .or_else(|| non_empty(config.report_release.as_ref()))
                        .unwrap_or_else(|| default_release.to_string()),
                }
            }
        };

        if account.service_url.is_empty() {
            return Err(AppError::InvalidUrl(format!(
                "no service URL configured for provider {}",
                provider.id
            )));
        }
        Ok(account)
    }
}
