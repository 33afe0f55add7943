//! netledger-core: Shared types, inventory interface, and error handling.
//!
//! This crate provides the foundational pieces used across netledger:
//! - Subnet and host types that flow from a scan into the inventory
//! - The `InventoryClient` trait every inventory backend implements
//! - Retry configuration for calls that leave the process
//! - Common error types

pub mod config;
pub mod error;
pub mod inventory;
pub mod types;

pub use config::RetryConfig;
pub use error::{InventoryError, TargetError};
pub use inventory::InventoryClient;
pub use types::{
    AddressPatch, DiscoveredHost, InventoryAddress, InventoryId, NewAddress, Subnet, SubnetTarget,
};
