//! Adapter for the Nationaler Statistikserver (NSS) aggregator.
//!
//! NSS exposes COUNTER 4 reports through a plain GET interface with the
//! SUSHI parameters in the query string and answers with SUSHI XML. Errors
//! come back as a 200 response carrying an `Exception` element.

use tally_core::error::AppError;
use tally_core::models::YearMonth;
use tally_core::traits::{FetchRequest, ReportAdapter};

use crate::account::SushiAccount;
use crate::http::{HttpClient, parse_url};
use crate::xml::{exception_reason, has_element};

/// NSS protocol adapter.
#[derive(Clone)]
pub struct NssAdapter {
    http: HttpClient,
    account: SushiAccount,
}

impl NssAdapter {
    pub const SERVICE_TYPE: &'static str = "NSS";
    pub const DEFAULT_RELEASE: &'static str = "4";

    pub fn new(http: HttpClient, account: SushiAccount) -> Self {
        Self { http, account }
    }
}

impl ReportAdapter for NssAdapter {
    fn service_type(&self) -> &'static str {
        Self::SERVICE_TYPE
    }

    fn release(&self) -> &str {
        &self.account.release
    }

    fn build_request(
        &self,
        report: &str,
        begin: YearMonth,
        end: YearMonth,
    ) -> Result<FetchRequest, AppError> {
        let mut url = parse_url(&self.account.service_url)?;
        {
            let account = &self.account;
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("APIKey", account.api_key.as_deref().unwrap_or_default())
                .append_pair("RequestorID", account.requestor_id.as_deref().unwrap_or_default())
                .append_pair("CustomerReference", account.customer_id.as_deref().unwrap_or_default())
                .append_pair("Report", report)
                .append_pair("Release", &account.release)
                .append_pair("BeginDate", &begin.first_day().format("%Y-%m-%d").to_string())
                .append_pair("EndDate", &end.last_day().format("%Y-%m-%d").to_string())
                .append_pair("Platform", account.platform.as_deref().unwrap_or_default())
                .append_pair("Format", "xml");
        }

        Ok(FetchRequest::get(url.as_str()))
    }

    fn is_valid_report(&self, raw_body: &str) -> bool {
        !has_element(raw_body, "Exception")
    }

    async fn fetch(&self, report: &str, begin: YearMonth, end: YearMonth) -> Result<String, AppError> {
        let request = self.build_request(report, begin, end)?;
        let body = self.http.execute(&request).await?;

        if !self.is_valid_report(&body) {
            return Err(AppError::ReportNotValid(exception_reason(&body, &["Exception"])));
        }
        Ok(body)
    }
}
