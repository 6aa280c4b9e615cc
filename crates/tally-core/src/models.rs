//! Domain models for providers, aggregators, and harvested reports.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::AppError;

// =============================================================================
// YearMonth
// =============================================================================

/// A calendar month without a day, the reporting granularity of COUNTER.
///
/// Ordered chronologically. The text form is `YYYY-MM`.
///
/// # Examples
///
/// ```
/// use tally_core::YearMonth;
///
/// let ym: YearMonth = "2019-12".parse().unwrap();
/// assert_eq!(ym.succ().to_string(), "2020-01");
/// assert_eq!(ym.pred().to_string(), "2019-11");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Creates a year-month, returning `None` if `month` is not in 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The current month in UTC.
    pub fn current() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following month.
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month.
    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// First day of the month.
    pub fn first_day(&self) -> NaiveDate {
        // month is validated on construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Last day of the month.
    pub fn last_day(&self) -> NaiveDate {
        self.succ()
            .first_day()
            .pred_opt()
            .unwrap_or_else(|| self.first_day())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidYearMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Deserializes an optional year-month where an empty string means absent.
fn deserialize_optional_year_month<'de, D>(deserializer: D) -> Result<Option<YearMonth>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Provider and Aggregator
// =============================================================================

/// Whether a provider takes part in scheduled harvesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestingStatus {
    #[serde(alias = "ACTIVE", alias = "Active")]
    Active,
    #[default]
    #[serde(alias = "INACTIVE", alias = "Inactive")]
    Inactive,
}

impl fmt::Display for HarvestingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// Reference from a provider to the aggregator that proxies its reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub vendor_code: Option<String>,
}

/// SUSHI endpoint used when a provider is harvested directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SushiConfig {
    pub service_type: Option<String>,
    pub service_url: Option<String>,
}

/// How and what to harvest for a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestingConfig {
    #[serde(default)]
    pub harvesting_status: HarvestingStatus,
    #[serde(default)]
    pub requested_reports: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_optional_year_month")]
    pub harvesting_start: Option<YearMonth>,
    #[serde(default, deserialize_with = "deserialize_optional_year_month")]
    pub harvesting_end: Option<YearMonth>,
    #[serde(default, deserialize_with = "deserialize_release")]
    pub report_release: Option<String>,
    pub aggregator: Option<AggregatorRef>,
    pub sushi_config: Option<SushiConfig>,
}

/// Credentials presented to the SUSHI service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SushiCredentials {
    pub customer_id: Option<String>,
    pub requestor_id: Option<String>,
    pub api_key: Option<String>,
    pub requestor_name: Option<String>,
    pub requestor_mail: Option<String>,
    pub platform: Option<String>,
}

/// A content provider whose usage reports are harvested.
///
/// Providers are owned by an external administrative service; the harvester
/// only reads them. Derived fields live in [`ProviderAggregates`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub harvesting_config: HarvestingConfig,
    #[serde(default)]
    pub sushi_credentials: SushiCredentials,
}

impl Provider {
    /// Returns true if the provider takes part in scheduled harvesting.
    pub fn is_active(&self) -> bool {
        self.harvesting_config.harvesting_status == HarvestingStatus::Active
    }

    /// The provider's own service type, used when no aggregator is referenced.
    pub fn service_type(&self) -> Option<&str> {
        self.harvesting_config
            .sushi_config
            .as_ref()
            .and_then(|c| c.service_type.as_deref())
    }

    pub fn service_url(&self) -> Option<&str> {
        self.harvesting_config
            .sushi_config
            .as_ref()
            .and_then(|c| c.service_url.as_deref())
    }

    pub fn aggregator(&self) -> Option<&AggregatorRef> {
        self.harvesting_config.aggregator.as_ref()
    }

    /// Requested report types, deduplicated in their configured order.
    pub fn requested_reports(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.harvesting_config
            .requested_reports
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty() && seen.insert(r.to_string()))
            .map(str::to_string)
            .collect()
    }
}

/// Connection settings of an aggregator account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorConfig {
    pub api_key: Option<String>,
    pub requestor_id: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_release")]
    pub report_release: Option<String>,
    pub vendor_code: Option<String>,
}

/// An intermediary service that proxies reports of several providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregator {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub service_type: String,
    pub service_url: String,
    #[serde(default)]
    pub aggregator_config: AggregatorConfig,
}

/// Accepts a release as either a JSON number (`4`, `5.1`) or a string.
fn deserialize_release<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// =============================================================================
// Reports
// =============================================================================

/// Namespace for deterministic report ids.
const REPORT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6b0e_1c4d_93a2_4f57_a1d8_2e9c_5b7f_0a31);

/// Derives the stable id of the report for this key tuple.
///
/// Harvesting the same provider, report, release and month always yields the
/// same id, which makes upserts idempotent.
pub fn report_id(provider_id: &str, report_name: &str, release: &str, month: YearMonth) -> Uuid {
    let key = format!("{}|{}|{}|{}", provider_id, report_name, release, month);
    Uuid::new_v5(&REPORT_ID_NAMESPACE, key.as_bytes())
}

/// One harvested (or failed) report for a provider and month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: Uuid,
    pub provider_id: String,
    pub report_name: String,
    pub release: String,
    pub year_month: YearMonth,
    /// Raw report document. `None` for failed attempts.
    pub payload: Option<serde_json::Value>,
    pub downloaded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub failed_attempts: Option<i32>,
    pub failed_reason: Option<String>,
}

impl ReportRecord {
    /// Builds the record of a successful harvest.
    ///
    /// JSON bodies are stored parsed; anything else (SUSHI XML) is kept as a
    /// JSON string.
    pub fn success(
        provider_id: &str,
        report_name: &str,
        release: &str,
        year_month: YearMonth,
        body: String,
        harvested_at: DateTime<Utc>,
    ) -> Self {
        let payload = serde_json::from_str::<serde_json::Value>(&body)
            .unwrap_or(serde_json::Value::String(body));
        Self {
            id: report_id(provider_id, report_name, release, year_month),
            provider_id: provider_id.to_string(),
            report_name: report_name.to_string(),
            release: release.to_string(),
            year_month,
            payload: Some(payload),
            downloaded_at: harvested_at,
            created_at: harvested_at,
            failed_attempts: None,
            failed_reason: None,
        }
    }

    /// Builds the record of a failed attempt.
    ///
    /// `previous_attempts` is the counter of the stored record with the same
    /// id, if any; the new counter is one higher.
    pub fn failure(
        provider_id: &str,
        report_name: &str,
        release: &str,
        year_month: YearMonth,
        reason: String,
        previous_attempts: Option<i32>,
        harvested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: report_id(provider_id, report_name, release, year_month),
            provider_id: provider_id.to_string(),
            report_name: report_name.to_string(),
            release: release.to_string(),
            year_month,
            payload: None,
            downloaded_at: harvested_at,
            created_at: harvested_at,
            failed_attempts: Some(previous_attempts.unwrap_or(0) + 1),
            failed_reason: Some(reason),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed_attempts.is_some()
    }

    /// The fields aggregate recomputation looks at.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            report_name: self.report_name.clone(),
            year_month: self.year_month,
            failed_attempts: self.failed_attempts,
            failed_reason: self.failed_reason.clone(),
        }
    }
}

/// Projection of a stored report used for aggregate recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub report_name: String,
    pub year_month: YearMonth,
    pub failed_attempts: Option<i32>,
    pub failed_reason: Option<String>,
}

/// Provider-level fields derived from the provider's stored reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAggregates {
    pub earliest_report: Option<YearMonth>,
    pub latest_report: Option<YearMonth>,
    pub report_types: Vec<String>,
    pub has_failed_report: bool,
    pub report_error_codes: Vec<String>,
}
