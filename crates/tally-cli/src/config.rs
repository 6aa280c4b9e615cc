use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::LazyLock;
use tally_core::YearMonth;
use uuid::Uuid;

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    // Use VERGEN_GIT_SHA for the commit hash (with safe slicing)
    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"); // YYYY-MM-DD
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables.
///
/// Connection settings given here override `harvester.toml`.
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(
    author,
    version = version_info(),
    about = "Harvester for COUNTER/SUSHI usage statistics"
)]
#[command(after_help = "Examples:
  tally init-db
  tally harvest
  tally harvest --tenant diku
  tally harvest --tenant diku --provider 0ba00047-b6cb-417a-a735-e2c1e45e30f1
  tally aggregates --provider 0ba00047-b6cb-417a-a735-e2c1e45e30f1")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Base URL of the platform gateway (overrides okapi_url in the config file)
    #[arg(long, env = "OKAPI_URL")]
    pub okapi_url: Option<String>,

    /// Token sent as X-Okapi-Token (overrides token in the config file)
    #[arg(long, env = "OKAPI_TOKEN", hide_env_values = true)]
    pub okapi_token: Option<String>,

    /// Custom path to harvester.toml
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "tally_core=debug" (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest usage reports for all tenants, one tenant, or one provider
    #[command(after_help = "Examples:
  tally harvest                                  # All tenants with the module enabled
  tally harvest --tenant diku                    # Every active provider of one tenant
  tally harvest --tenant diku --provider ID      # A single provider
  tally harvest --current-month 2024-01          # Fetch nothing after 2023-12")]
    Harvest {
        /// Restrict the run to one tenant
        #[arg(short, long, value_name = "TENANT")]
        tenant: Option<String>,

        /// Restrict the run to one provider of the tenant
        #[arg(short, long, value_name = "ID", requires = "tenant")]
        provider: Option<String>,

        /// Treat this month (YYYY-MM) as the current one
        #[arg(long, value_name = "YYYY-MM")]
        current_month: Option<YearMonth>,
    },
    /// Show a provider's derived fields and stored reports
    Aggregates {
        /// Provider id
        #[arg(short, long, value_name = "ID")]
        provider: String,
    },
    /// Delete a stored report and recompute its provider's aggregates
    DeleteReport {
        /// Report id
        id: Uuid,
    },
    /// Create the database tables
    InitDb,
}
