//! Recomputation of provider-level aggregates.
//!
//! Every store mutation (upsert or delete) re-derives the provider's
//! aggregates from the provider's complete set of reports. Recomputing from
//! scratch, instead of patching the previous values, means a corrected or
//! deleted report immediately drops out of the failure flag and error codes.
//!
//! Callers must run [`recompute`] inside the same provider-scoped consistency
//! boundary as the mutation itself (a database transaction holding the
//! provider's row lock, or a per-provider mutex).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ProviderAggregates, ReportSummary};

/// Error code used when a failure reason carries no SUSHI exception number.
pub const OTHER_ERROR_CODE: &str = "other";

/// Matches SUSHI/COUNTER exception numbers in the forms the services emit:
/// `<Number>3030</Number>`, `<s:Number>3030</s:Number>`, `Number="3030"`,
/// `"Code": 3030` and `Code=3030`.
static ERROR_CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:<(?:\w+:)?Number>\s*(\d+)\s*<|Number\s*=\s*"?(\d+)|"Code"\s*:\s*"?(\d+)|\bCode\s*=\s*"?(\d+))"#,
    )
    .expect("error code pattern is valid")
});

/// Extracts the classification code from a failure reason.
///
/// # Examples
///
/// ```
/// use tally_core::aggregate::error_code;
///
/// assert_eq!(error_code("Report not valid: <Exception><Number>3030</Number>"), "3030");
/// assert_eq!(error_code("HTTP 503 from https://example.com"), "other");
/// ```
pub fn error_code(failed_reason: &str) -> String {
    ERROR_CODE_PATTERN
        .captures(failed_reason)
        .and_then(|caps| caps.iter().skip(1).flatten().next())
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| OTHER_ERROR_CODE.to_string())
}

/// Derives a provider's aggregates from all of its current reports.
pub fn recompute<'a, I>(reports: I) -> ProviderAggregates
where
    I: IntoIterator<Item = &'a ReportSummary>,
{
    let mut aggregates = ProviderAggregates::default();
    let mut report_types = BTreeSet::new();
    let mut error_codes = BTreeSet::new();

    for report in reports {
        report_types.insert(report.report_name.clone());

        if report.failed_attempts.is_some() {
            aggregates.has_failed_report = true;
            error_codes.insert(error_code(report.failed_reason.as_deref().unwrap_or_default()));
            continue;
        }

        let month = report.year_month;
        aggregates.earliest_report = Some(aggregates.earliest_report.map_or(month, |m| m.min(month)));
        aggregates.latest_report = Some(aggregates.latest_report.map_or(month, |m| m.max(month)));
    }

    aggregates.report_types = report_types.into_iter().collect();
    aggregates.report_error_codes = error_codes.into_iter().collect();
    aggregates
}
