//! Tally DB - PostgreSQL persistence for harvested reports
//!
//! This crate stores report records and keeps each provider's derived
//! aggregates consistent with them.
//!
//! # Overview
//!
//! The main components are:
//! - [`ReportRepository`] - report persistence implementing `ReportStore`
//! - [`init_schema`] - creates the `reports` and `provider_aggregates` tables

mod report_repository;
mod schema;

pub use report_repository::ReportRepository;
pub use schema::{MIGRATIONS, init_schema};
