//! netledger-discover: Reconcile live network scans into a phpIPAM inventory.
//!
//! Runs nmap against configured subnets, makes sure each subnet exists in
//! the inventory, and upserts every discovered host keyed by its IP.

pub mod config;
pub mod error;
pub mod provision;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod scan_text;
pub mod scanner;

pub use error::{DiscoverError, ProvisionError, Result};
pub use reconcile::ReconciliationEngine;
pub use report::ReconciliationReport;
