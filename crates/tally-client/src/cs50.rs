//! Adapter for COUNTER 5 REST (SUSHI 5) services.

use serde_json::Value;
use tally_core::error::AppError;
use tally_core::models::YearMonth;
use tally_core::traits::{FetchRequest, ReportAdapter};

use crate::account::SushiAccount;
use crate::http::{HttpClient, excerpt, parse_url};

/// Exception codes that mean "no report" when a server omits the severity.
const ERROR_CODES: std::ops::RangeInclusive<i64> = 1000..=3030;

/// COUNTER 5 protocol adapter.
#[derive(Clone)]
pub struct Cs50Adapter {
    http: HttpClient,
    account: SushiAccount,
}

impl Cs50Adapter {
    pub const SERVICE_TYPE: &'static str = "cs50";
    pub const DEFAULT_RELEASE: &'static str = "5";

    pub fn new(http: HttpClient, account: SushiAccount) -> Self {
        Self { http, account }
    }
}

/// Returns true if a COUNTER 5 exception object denotes an error.
fn is_error_exception(exception: &Value) -> bool {
    if let Some(severity) = exception.get("Severity").and_then(Value::as_str) {
        return severity.eq_ignore_ascii_case("error") || severity.eq_ignore_ascii_case("fatal");
    }
    let code = match exception.get("Code") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    code.is_some_and(|c| ERROR_CODES.contains(&c))
}

/// Returns true for a bare exception object (no report header).
fn is_bare_exception(value: &Value) -> bool {
    value.get("Report_Header").is_none() && value.get("Code").is_some()
}

fn exceptions_of(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// The first exception that makes a response unusable, if any.
fn error_exception(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find(|item| is_bare_exception(item)),
        Value::Object(_) if is_bare_exception(value) => Some(value),
        Value::Object(_) => {
            let header = value.get("Report_Header");
            exceptions_of(header.and_then(|h| h.get("Exceptions")))
                .chain(exceptions_of(value.get("Exceptions")))
                .find(|exception| is_error_exception(exception))
        }
        _ => None,
    }
}

/// Renders an exception as `Code=3030, Severity=Error, Message=...`.
fn describe_exception(exception: &Value) -> String {
    let fields: Vec<String> = ["Code", "Severity", "Message", "Data"]
        .iter()
        .filter_map(|name| {
            let text = match exception.get(*name)? {
                Value::Null => return None,
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            Some(format!("{}={}", name, text))
        })
        .collect();

    if fields.is_empty() {
        excerpt(&exception.to_string())
    } else {
        excerpt(&fields.join(", "))
    }
}

/// Builds the failure reason for a rejected body.
fn rejection_reason(raw_body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(raw_body).ok();
    match parsed.as_ref().and_then(error_exception) {
        Some(exception) => describe_exception(exception),
        None => excerpt(raw_body),
    }
}

impl ReportAdapter for Cs50Adapter {
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
        let base = self.account.service_url.trim().trim_end_matches('/');
        let mut url = parse_url(&format!("{}/reports/{}", base, report.to_lowercase()))?;
        {
            let account = &self.account;
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("customer_id", account.customer_id.as_deref().unwrap_or_default());
            if let Some(requestor_id) = &account.requestor_id {
                pairs.append_pair("requestor_id", requestor_id);
            }
            if let Some(api_key) = &account.api_key {
                pairs.append_pair("api_key", api_key);
            }
            pairs
                .append_pair("begin_date", &begin.to_string())
                .append_pair("end_date", &end.to_string());
            if let Some(platform) = &account.platform {
                pairs.append_pair("platform", platform);
            }
        }

        Ok(FetchRequest::get(url.as_str()).with_header("Accept", "application/json"))
    }

    fn is_valid_report(&self, raw_body: &str) -> bool {
        match serde_json::from_str::<Value>(raw_body) {
            Ok(value @ (Value::Array(_) | Value::Object(_))) => error_exception(&value).is_none(),
            _ => false,
        }
    }

    async fn fetch(&self, report: &str, begin: YearMonth, end: YearMonth) -> Result<String, AppError> {
        let request = self.build_request(report, begin, end)?;
        let body = self.http.execute(&request).await?;

        if !self.is_valid_report(&body) {
            return Err(AppError::ReportNotValid(rejection_reason(&body)));
        }
        Ok(body)
    }
}
