//! Tally Client - HTTP implementations of the harvester's I/O traits
//!
//! This crate provides:
//!
//! - [`adapter`] - the [`AdapterFactoryEnum`] selecting a protocol adapter by
//!   service type, and the [`ReportAdapterEnum`] it produces
//! - [`nss`], [`cs41`], [`cs50`] - the supported SUSHI protocols
//! - [`directory`] - [`HttpTenantDirectory`], the gateway client for tenants,
//!   providers and aggregator settings
//!
//! # Overview
//!
//! All requests go through [`http::HttpClient`], which classifies failures
//! into transport and decode errors. Adapters add content validation: a 200
//! response carrying a SUSHI exception is reported as
//! `AppError::ReportNotValid`.

pub mod account;
pub mod adapter;
pub mod cs41;
pub mod cs50;
pub mod directory;
pub mod http;
pub mod nss;
mod xml;

// Re-export main client types
pub use account::SushiAccount;
pub use adapter::{AdapterFactoryEnum, ReportAdapterEnum};
pub use directory::HttpTenantDirectory;
pub use http::HttpClient;
