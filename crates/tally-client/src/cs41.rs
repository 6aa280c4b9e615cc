//! Adapter for COUNTER-SUSHI 4.1 SOAP services.

use tally_core::error::AppError;
use tally_core::models::YearMonth;
use tally_core::traits::{FetchRequest, ReportAdapter};

use crate::account::SushiAccount;
use crate::http::{HttpClient, parse_url};
use crate::xml::{escape, exception_reason, has_element};

const SOAP_ACTION: &str = "SushiService:GetReportIn";

/// COUNTER-SUSHI 4.1 protocol adapter.
///
/// Sends a `ReportRequest` SOAP envelope and treats any `Exception` element or
/// SOAP `Fault` in the response as a content failure.
#[derive(Clone)]
pub struct Cs41Adapter {
    http: HttpClient,
    account: SushiAccount,
}

impl Cs41Adapter {
    pub const SERVICE_TYPE: &'static str = "cs41";
    pub const DEFAULT_RELEASE: &'static str = "4";

    pub fn new(http: HttpClient, account: SushiAccount) -> Self {
        Self { http, account }
    }

    fn envelope(&self, report: &str, begin: YearMonth, end: YearMonth) -> String {
        let account = &self.account;
        let field = |v: &Option<String>| escape(v.as_deref().unwrap_or_default());

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:sus="http://www.niso.org/schemas/sushi" xmlns:coun="http://www.niso.org/schemas/sushi/counter">
  <soap:Body>
    <coun:ReportRequest>
      <sus:Requestor>
        <sus:ID>{requestor_id}</sus:ID>
        <sus:Name>{requestor_name}</sus:Name>
        <sus:Email>{requestor_mail}</sus:Email>
      </sus:Requestor>
      <sus:CustomerReference>
        <sus:ID>{customer_id}</sus:ID>
      </sus:CustomerReference>
      <sus:ReportDefinition Name="{report}" Release="{release}">
        <sus:Filters>
          <sus:UsageDateRange>
            <sus:Begin>{begin}</sus:Begin>
            <sus:End>{end}</sus:End>
          </sus:UsageDateRange>
        </sus:Filters>
      </sus:ReportDefinition>
    </coun:ReportRequest>
  </soap:Body>
</soap:Envelope>"#,
            requestor_id = field(&account.requestor_id),
            requestor_name = field(&account.requestor_name),
            requestor_mail = field(&account.requestor_mail),
            customer_id = field(&account.customer_id),
            report = escape(report),
            release = escape(&account.release),
            begin = begin.first_day().format("%Y-%m-%d"),
            end = end.last_day().format("%Y-%m-%d"),
        )
    }
}

impl ReportAdapter for Cs41Adapter {
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
        let url = parse_url(&self.account.service_url)?;
        Ok(FetchRequest::post(url.as_str(), self.envelope(report, begin, end))
            .with_header("Content-Type", "text/xml; charset=utf-8")
            .with_header("SOAPAction", SOAP_ACTION))
    }

    fn is_valid_report(&self, raw_body: &str) -> bool {
        !has_element(raw_body, "Exception") && !has_element(raw_body, "Fault")
    }

    async fn fetch(&self, report: &str, begin: YearMonth, end: YearMonth) -> Result<String, AppError> {
        let request = self.build_request(report, begin, end)?;
        let body = self.http.execute(&request).await?;

        if !self.is_valid_report(&body) {
            let reason = exception_reason(&body, &["Exception", "Fault"]);
            return Err(AppError::ReportNotValid(reason));
        }
        Ok(body)
    }
}
