//! The inventory boundary.
//!
//! Reconciliation only ever talks to the address inventory through this
//! trait. None of the calls are transactional with respect to each other:
//! a find followed by a create can race with another writer.

use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::error::InventoryError;
use crate::types::{AddressPatch, InventoryAddress, InventoryId, NewAddress, Subnet, SubnetTarget};

#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Every subnet the inventory knows about.
    async fn list_subnets(&self) -> Result<Vec<Subnet>, InventoryError>;

    /// Create a subnet. Returns [`InventoryError::Conflict`] when one with
    /// the same network and prefix already exists.
    async fn create_subnet(&self, target: &SubnetTarget) -> Result<Subnet, InventoryError>;

    /// Look up an address by IP. `Ok(None)` when the inventory has no record.
    async fn find_address(&self, ip: Ipv4Addr) -> Result<Option<InventoryAddress>, InventoryError>;

    async fn create_address(&self, address: &NewAddress)
        -> Result<InventoryAddress, InventoryError>;

    /// Apply a partial update to an existing address.
    async fn update_address(
        &self,
        id: &InventoryId,
        patch: &AddressPatch,
    ) -> Result<(), InventoryError>;
}
