use thiserror::Error;

/// Outcome category of a failure.
///
/// Every [`AppError`] belongs to exactly one category. The harvester uses the
/// category to decide how far a failure propagates: content and transport
/// failures become failed-attempt records, precondition failures skip a single
/// provider, and only a failure to enumerate tenants aborts a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection refused/reset, timeout, non-2xx status.
    Transport,
    /// A 2xx response whose body could not be read or parsed.
    Decode,
    /// A well-formed response that carries a vendor-side error payload.
    Content,
    /// Missing aggregator, unknown service type, missing module and similar.
    Precondition,
    /// Report store failure.
    Persistence,
    /// Invalid configuration or local input.
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Decode => "decode",
            ErrorKind::Content => "content",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Config => "config",
        };
        f.write_str(s)
    }
}

/// Application-wide error types.
///
/// This enum represents all failures of the Tally harvester. It uses the
/// `thiserror` crate for ergonomic error handling and automatic conversion
/// from underlying library errors.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```
/// use tally_core::error::{AppError, ErrorKind};
///
/// let err = AppError::ReportNotValid("<s:Exception>...".to_string());
/// assert_eq!(err.kind(), ErrorKind::Content);
/// assert!(err.to_string().starts_with("Report not valid"));
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx, including connection failures, query
    /// errors, and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// The request never produced a 2xx response.
    ///
    /// `status` is `None` when no response was received at all (connection
    /// refused, DNS failure, reset).
    #[error("{}", transport_message(url, *status, message))]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// Request timeout.
    #[error("Request to {url} timed out after {secs} seconds")]
    Timeout { url: String, secs: u64 },

    /// A 2xx response whose body could not be decoded into the expected shape.
    #[error("Error decoding response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The vendor answered with an error payload instead of report data.
    #[error("Report not valid: {0}")]
    ReportNotValid(String),

    /// The provider references an aggregator but the reference has no id.
    #[error("No aggregator found for provider {0}")]
    NoAggregator(String),

    /// Aggregator settings could not be resolved.
    #[error("Could not resolve aggregator {id}: {source}")]
    AggregatorLookup {
        id: String,
        #[source]
        source: Box<AppError>,
    },

    /// No protocol adapter is registered for this service type.
    #[error("No service implementation available for service type '{0}'")]
    UnknownServiceType(String),

    /// A year-month value was missing or malformed.
    #[error("Invalid year-month '{0}': expected YYYY-MM")]
    InvalidYearMonth(String),

    /// The tenant listing came back empty.
    #[error("No tenants found")]
    NoTenants,

    /// The harvesting module is not enabled for the tenant.
    #[error("Module {module} is not enabled for tenant {tenant}")]
    ModuleNotEnabled { tenant: String, module: String },

    /// The directory has no provider with this id.
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants.
    #[error("Error: {0}")]
    Generic(String),
}

fn transport_message(url: &str, status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {} from {}: {}", code, url, message),
        None => format!("Request to {} failed: {}", url, message),
    }
}

impl AppError {
    /// Returns the outcome category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Transport { .. } | AppError::Timeout { .. } => ErrorKind::Transport,
            AppError::Decode { .. } | AppError::SerializationError(_) => ErrorKind::Decode,
            AppError::ReportNotValid(_) => ErrorKind::Content,
            AppError::NoAggregator(_)
            | AppError::AggregatorLookup { .. }
            | AppError::UnknownServiceType(_)
            | AppError::InvalidYearMonth(_)
            | AppError::NoTenants
            | AppError::ModuleNotEnabled { .. }
            | AppError::ProviderNotFound(_) => ErrorKind::Precondition,
            AppError::DatabaseError(_) => ErrorKind::Persistence,
            AppError::InvalidUrl(_) | AppError::ConfigError(_) | AppError::Generic(_) => {
                ErrorKind::Config
            }
        }
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check DATABASE_URL."
                        .to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::Transport { status: None, .. } => {
                format!("{}\n   Check the service URL and your network connection.", self)
            }
            AppError::Timeout { url, secs } => {
                format!(
                    "Request to {} timed out after {} seconds.\n   The service may be overloaded. It will be retried on the next run.",
                    url, secs
                )
            }
            AppError::NoTenants => {
                "No tenants found.\n   Check OKAPI_URL and that at least one tenant exists."
                    .to_string()
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your configuration file.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }
}
