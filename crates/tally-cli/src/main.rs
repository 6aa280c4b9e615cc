use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use tally_client::{AdapterFactoryEnum, HttpTenantDirectory};
use tally_core::traits::TenantDirectory;
use tally_core::{
    BatchHarvestSummary, HarvestService, HarvesterConfig, Orchestrator, ProviderAggregates,
    ProviderHarvestOutcome, ReportRecord, TracingReporter, YearMonth, load_harvester_config,
};
use tally_db::ReportRepository;
use tally_cli::{Command, Config};

type Harvester = Orchestrator<ReportRepository, HttpTenantDirectory, AdapterFactoryEnum>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let harvester_config = harvester_config(&config)?;

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(harvester_config.db.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let repo = ReportRepository::new(pool.clone());

    match config.command {
        Command::InitDb => {
            tally_db::init_schema(&pool)
                .await
                .context("Failed to create tables")?;
            info!("Database schema ready");
        }
        Command::Harvest {
            tenant,
            provider,
            current_month,
        } => {
            let directory = HttpTenantDirectory::new(&harvester_config)?;
            let factory = AdapterFactoryEnum::new(&harvester_config.http)?;

            let mut harvest_config = harvester_config.harvest_config();
            if let Some(month) = current_month {
                harvest_config = harvest_config.with_current_month(month);
            }
            let harvest_service =
                HarvestService::with_config(repo, directory, factory, harvest_config);
            let orchestrator =
                Orchestrator::with_config(harvest_service, harvester_config.orchestrator_config());

            handle_harvest(&orchestrator, tenant, provider).await?;
        }
        Command::Aggregates { provider } => {
            show_aggregates(&repo, &provider).await?;
        }
        Command::DeleteReport { id } => {
            delete_report(&repo, id).await?;
        }
    }

    Ok(())
}

/// Loads `harvester.toml` and applies command line and environment overrides.
///
/// Only `harvest` reads the file; the database commands use defaults so they
/// never create a config template.
fn harvester_config(config: &Config) -> anyhow::Result<HarvesterConfig> {
    if !matches!(config.command, Command::Harvest { .. }) {
        return Ok(HarvesterConfig::default());
    }

    let mut harvester = load_harvester_config(config.config.clone())
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if let Some(url) = &config.okapi_url {
        harvester.okapi_url = url.clone();
    }
    if let Some(token) = &config.okapi_token {
        harvester.token = Some(token.clone());
    }
    Ok(harvester)
}

/// Handle the harvest command with its three scopes:
/// 1. All tenants
/// 2. One tenant
/// 3. One provider of a tenant
async fn handle_harvest(
    orchestrator: &Harvester,
    tenant: Option<String>,
    provider: Option<String>,
) -> anyhow::Result<()> {
    let reporter = TracingReporter;

    match (tenant, provider) {
        (None, None) => {
            info!("═══════════════════════════════════════════════════════════");
            info!("Starting harvest of all tenants");
            info!("═══════════════════════════════════════════════════════════");

            let summary = orchestrator
                .run_with_progress(&reporter)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            print_batch_summary(&summary);
        }

        (Some(tenant), None) => {
            let result = orchestrator
                .run_tenant_with_progress(&tenant, &reporter)
                .await;
            let mut summary = BatchHarvestSummary::new();
            summary.add(result);
            print_batch_summary(&summary);
        }

        (Some(tenant), Some(provider_id)) => {
            let service = orchestrator.harvest_service();
            let provider = service
                .directory()
                .get_provider(&tenant, &provider_id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            info!("Harvesting provider: {} ({})", provider.label, provider.id);
            let outcome = service
                .harvest_provider_with_progress(&tenant, &provider, &reporter)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            print_provider_summary(&provider.label, &outcome);
        }

        // This case is prevented by clap's `requires`
        (None, Some(_)) => unreachable!("--provider requires --tenant"),
    }

    Ok(())
}

/// Print a summary of a harvest run.
fn print_batch_summary(summary: &BatchHarvestSummary) {
    let stats = summary.total_stats();

    info!("");
    info!("═══════════════════════════════════════════════════════════");
    info!("HARVEST COMPLETE");
    info!("═══════════════════════════════════════════════════════════");
    info!("  Tenants processed:   {}", summary.total_tenants());
    info!("  Tenants failed:      {}", summary.failed_tenants());
    info!("  Providers processed: {}", summary.total_providers());
    info!("  Providers failed:    {}", summary.failed_providers());
    info!("───────────────────────────────────────────────────────────");
    info!("  Reports fetched:     {}", stats.fetched);
    info!("  Failed attempts:     {}", stats.failed);
    info!("  Store errors:        {}", stats.store_errors);
    info!("  Already stored:      {}", stats.already_stored);

    if summary.failed_tenants() > 0 || summary.failed_providers() > 0 {
        info!("───────────────────────────────────────────────────────────");
        info!("Failures:");
        for tenant in &summary.tenants {
            if let Some(err) = &tenant.error {
                error!("  - tenant {}: {}", tenant.tenant, err);
            }
            for provider in &tenant.providers {
                if let Some(err) = provider.error() {
                    error!(
                        "  - {}/{} ({}): {}",
                        tenant.tenant, provider.provider_label, provider.provider_id, err
                    );
                }
            }
        }
    }
    info!("═══════════════════════════════════════════════════════════");
}

/// Print a summary for a single provider harvest.
fn print_provider_summary(label: &str, outcome: &ProviderHarvestOutcome) {
    match outcome {
        ProviderHarvestOutcome::Skipped(reason) => {
            warn!("Provider {} skipped: {}", label, reason);
        }
        ProviderHarvestOutcome::Harvested(stats) => {
            info!("");
            info!("═══════════════════════════════════════════════════════════");
            info!("Harvest complete: {}", label);
            info!("═══════════════════════════════════════════════════════════");
            info!("  + Fetched:           {}", stats.fetched);
            info!("  ✗ Failed:            {}", stats.failed);
            info!("  ! Store errors:      {}", stats.store_errors);
            info!("  = Already stored:    {}", stats.already_stored);
            info!("═══════════════════════════════════════════════════════════");

            if stats.failed == 0 && stats.store_errors == 0 {
                info!("All reports harvested successfully!");
            }
        }
    }
}

async fn show_aggregates(repo: &ReportRepository, provider_id: &str) -> anyhow::Result<()> {
    let Some(aggregates) = repo.provider_aggregates(provider_id).await? else {
        println!("\nNo reports stored for provider {}\n", provider_id);
        return Ok(());
    };
    let reports = repo.list_for_provider(provider_id).await?;

    println!("\nProvider {}\n", provider_id);
    print_aggregates(&aggregates);

    if !reports.is_empty() {
        println!("\n  Reports:");
        for report in &reports {
            println!("    {}", report_line(report));
        }
    }
    println!();

    Ok(())
}

fn print_aggregates(aggregates: &ProviderAggregates) {
    println!("  Earliest report:     {}", month_or_dash(aggregates.earliest_report));
    println!("  Latest report:       {}", month_or_dash(aggregates.latest_report));
    println!("  Report types:        {}", list_or_dash(&aggregates.report_types));
    println!("  Has failed report:   {}", aggregates.has_failed_report);
    println!("  Error codes:         {}", list_or_dash(&aggregates.report_error_codes));
}

async fn delete_report(repo: &ReportRepository, id: Uuid) -> anyhow::Result<()> {
    if repo.delete(id).await? {
        info!("Deleted report {}", id);
    } else {
        warn!("No report with id {}", id);
    }
    Ok(())
}

fn month_or_dash(month: Option<YearMonth>) -> String {
    month.map_or_else(|| "-".to_string(), |m| m.to_string())
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn report_line(report: &ReportRecord) -> String {
    let status = match (report.failed_attempts, &report.failed_reason) {
        (None, _) => "ok".to_string(),
        (Some(n), Some(reason)) => format!("failed x{}: {}", n, truncate_text(reason, 80)),
        (Some(n), None) => format!("failed x{}", n),
    };
    format!(
        "{:<6} r{:<4} {}  {}  [{}]",
        report.report_name, report.release, report.year_month, status, report.id
    )
}

fn truncate_text(text: &str, max_len: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() <= max_len {
        cleaned
    } else {
        // Safely truncate text by characters to handle multi-byte UTF-8
        let truncated: String = cleaned.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}
