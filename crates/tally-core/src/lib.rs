//! Tally Core - Domain types, business logic, and services.
//!
//! This crate provides the core functionality for Tally, a COUNTER/SUSHI
//! usage statistics harvester:
//!
//! - **Domain models**: [`Provider`], [`Aggregator`], [`ReportRecord`], [`YearMonth`]
//! - **Business logic**: fetch window planning, aggregate recomputation
//! - **Services**: [`HarvestService`] for one provider, [`Orchestrator`] for batch runs
//! - **Traits**: [`ReportAdapter`], [`AdapterFactory`], [`TenantDirectory`], [`ReportStore`]
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging/UI
//!
//! # Architecture
//!
//! Business logic is decoupled from I/O through traits. HTTP implementations
//! live in `tally-client`, the PostgreSQL store in `tally-db`.
//!
//! # Example
//!
//! ```ignore
//! use tally_core::{HarvestService, Orchestrator};
//! use tally_core::progress::TracingReporter;
//!
//! let harvest = HarvestService::new(repo, directory, adapter_factory);
//! let orchestrator = Orchestrator::new(harvest);
//! let summary = orchestrator.run_with_progress(&TracingReporter).await?;
//! println!("{} providers failed", summary.failed_providers());
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod harvest;
pub mod memory_store;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod stats;
pub mod traits;
pub mod window;

// Configuration
pub use config::{
    DbConfig, HarvestConfig, HarvesterConfig, HttpConfig, OrchestratorConfig,
    default_config_path, load_harvester_config,
};

// Error handling
pub use error::{AppError, ErrorKind};

// Domain models
pub use models::{
    Aggregator, AggregatorConfig, AggregatorRef, HarvestingConfig, HarvestingStatus, Provider,
    ProviderAggregates, ReportRecord, ReportSummary, SushiConfig, SushiCredentials, YearMonth,
    report_id,
};

// Statistics and results
pub use stats::{
    AtomicHarvestStats, BatchHarvestSummary, HarvestStats, MonthOutcome, ProviderHarvestOutcome,
    ProviderHarvestResult, SkipReason, TenantHarvestResult,
};

// Progress reporting
pub use progress::{HarvestEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use traits::{AdapterFactory, FetchRequest, Method, ReportAdapter, ReportStore, TenantDirectory};

// Planning and aggregates
pub use aggregate::{error_code, recompute};
pub use window::FetchWindow;

// Services (generic over trait implementations)
pub use harvest::HarvestService;
pub use memory_store::MemoryReportStore;
pub use orchestrator::Orchestrator;
