//! Configuration types for Tally components.
//!
//! Runtime settings live in `harvester.toml`. Values from the command line
//! or the environment (`OKAPI_URL`, `OKAPI_TOKEN`, `DATABASE_URL`) override
//! the file; that layering happens in the CLI.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::models::YearMonth;

/// Database connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

/// HTTP client configuration for the directory and SUSHI services.
///
/// Requests are not retried. A failed month is recorded and picked up again
/// by the next run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("tally/{}", env!("CARGO_PKG_VERSION"))
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Settings of a single provider harvest.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Number of report months fetched concurrently per provider.
    pub concurrency: usize,
    /// Overrides the running month; `None` means the current UTC month.
    pub current_month: Option<YearMonth>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            current_month: None,
        }
    }
}

impl HarvestConfig {
    /// Pins the running month, which fixes the fetch window ceiling.
    pub fn with_current_month(mut self, month: YearMonth) -> Self {
        self.current_month = Some(month);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The month the fetch window is computed against.
    pub fn current_month(&self) -> YearMonth {
        self.current_month.unwrap_or_else(YearMonth::current)
    }
}

/// Fan-out limits of a batch run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub tenant_concurrency: usize,
    pub provider_concurrency: usize,
    /// Upper bound on one provider's total harvest time.
    pub provider_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tenant_concurrency: 2,
            provider_concurrency: 4,
            provider_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Root configuration structure for harvester.toml.
///
/// # Example
///
/// ```toml
/// okapi_url = "http://localhost:9130"
/// module_id = "mod-erm-usage-harvester-4.0.0"
///
/// [harvest]
/// tenant_concurrency = 2
/// provider_concurrency = 4
/// month_concurrency = 4
/// provider_timeout_secs = 1800
///
/// [http]
/// timeout_secs = 60
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvesterConfig {
    /// Base URL of the platform gateway.
    #[serde(default = "default_okapi_url")]
    pub okapi_url: String,

    /// Module id that must be enabled for a tenant to be harvested.
    #[serde(default = "default_module_id")]
    pub module_id: String,

    /// Token sent as `X-Okapi-Token`.
    pub token: Option<String>,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub harvest: HarvestSection,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub db: DbConfig,
}

fn default_okapi_url() -> String {
    "http://localhost:9130".to_string()
}

fn default_module_id() -> String {
    "mod-erm-usage-harvester".to_string()
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            okapi_url: default_okapi_url(),
            module_id: default_module_id(),
            token: None,
            paths: PathsConfig::default(),
            harvest: HarvestSection::default(),
            http: HttpConfig::default(),
            db: DbConfig::default(),
        }
    }
}

impl HarvesterConfig {
    pub fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig::default().with_concurrency(self.harvest.month_concurrency)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            tenant_concurrency: self.harvest.tenant_concurrency.max(1),
            provider_concurrency: self.harvest.provider_concurrency.max(1),
            provider_timeout: Duration::from_secs(self.harvest.provider_timeout_secs),
        }
    }
}

/// Gateway paths, relative to `okapi_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_tenants_path")]
    pub tenants: String,
    #[serde(default = "default_providers_path")]
    pub providers: String,
    #[serde(default = "default_aggregators_path")]
    pub aggregators: String,
    /// Page size of the provider listing. Only the first page is read.
    #[serde(default = "default_provider_page_size")]
    pub provider_page_size: usize,
}

fn default_tenants_path() -> String {
    "/_/proxy/tenants".to_string()
}

fn default_providers_path() -> String {
    "/usage-data-providers".to_string()
}

fn default_aggregators_path() -> String {
    "/aggregator-settings".to_string()
}

fn default_provider_page_size() -> usize {
    30
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            tenants: default_tenants_path(),
            providers: default_providers_path(),
            aggregators: default_aggregators_path(),
            provider_page_size: default_provider_page_size(),
        }
    }
}

/// The `[harvest]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSection {
    #[serde(default = "default_tenant_concurrency")]
    pub tenant_concurrency: usize,
    #[serde(default = "default_provider_concurrency")]
    pub provider_concurrency: usize,
    #[serde(default = "default_month_concurrency")]
    pub month_concurrency: usize,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

fn default_tenant_concurrency() -> usize {
    2
}

fn default_provider_concurrency() -> usize {
    4
}

fn default_month_concurrency() -> usize {
    4
}

fn default_provider_timeout_secs() -> u64 {
    30 * 60
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            tenant_concurrency: default_tenant_concurrency(),
            provider_concurrency: default_provider_concurrency(),
            month_concurrency: default_month_concurrency(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "harvester.toml";

/// Returns the default configuration directory path: `~/.config/tally/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tally"))
}

/// Returns the default configuration file path: `~/.config/tally/harvester.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Tally harvester configuration
#
# Usage:
#   tally harvest                             # All tenants
#   tally harvest --tenant diku               # One tenant
#   tally harvest --tenant diku --provider ID # One provider
#
# OKAPI_URL, OKAPI_TOKEN and DATABASE_URL override the values below.

okapi_url = "http://localhost:9130"
module_id = "mod-erm-usage-harvester"

[harvest]
tenant_concurrency = 2
provider_concurrency = 4
month_concurrency = 4
provider_timeout_secs = 1800

[http]
timeout_secs = 60

[db]
max_connections = 5
"#;

/// Load harvester configuration from a TOML file.
///
/// # Arguments
/// * `path` - Optional custom path. If `None`, uses the default XDG path.
///
/// # Returns
/// * `Ok(config)` - Configuration loaded, or defaults when no file exists at
///   the default path and none could be created
/// * `Err(e)` - A custom path does not exist, or the file is invalid
///
/// # Behavior
/// If no configuration file exists at the default path, a template file
/// is created to help users get started.
pub fn load_harvester_config(path: Option<PathBuf>) -> Result<HarvesterConfig, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(HarvesterConfig::default()),
        },
    };

    if !config_path.exists() {
        if !using_default_path {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
        if let Err(e) = create_default_config(&config_path) {
            // Not fatal: the user may lack write permissions.
            tracing::warn!("Could not create default config template: {}", e);
            return Ok(HarvesterConfig::default());
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}
