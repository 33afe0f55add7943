//! netledger-ipam: phpIPAM client for the address inventory.
//!
//! This crate is the only place that knows phpIPAM's REST dialect. All
//! reconciliation writes flow through the [`InventoryClient`] impl below.

pub mod client;
pub mod mutations;
pub mod queries;

use std::net::Ipv4Addr;

use async_trait::async_trait;

use netledger_core::{
    AddressPatch, InventoryAddress, InventoryClient, InventoryError, InventoryId, NewAddress,
    Subnet, SubnetTarget,
};

pub use client::{IpamClient, IpamConfig};

#[async_trait]
impl InventoryClient for IpamClient {
    async fn list_subnets(&self) -> Result<Vec<Subnet>, InventoryError> {
        self.fetch_subnets().await
    }

    async fn create_subnet(&self, target: &SubnetTarget) -> Result<Subnet, InventoryError> {
        self.add_subnet(target).await
    }

    async fn find_address(&self, ip: Ipv4Addr) -> Result<Option<InventoryAddress>, InventoryError> {
        self.search_address(ip).await
    }

    async fn create_address(
        &self,
        address: &NewAddress,
    ) -> Result<InventoryAddress, InventoryError> {
        self.add_address(address).await
    }

    async fn update_address(
        &self,
        id: &InventoryId,
        patch: &AddressPatch,
    ) -> Result<(), InventoryError> {
        self.patch_address(id, patch).await
    }
}
