//! Write operations for the phpIPAM inventory.
//!
//! phpIPAM has no native upsert: addresses are either created with
//! `POST addresses/` or partially updated with `PATCH addresses/<id>/`.
//! Choosing between the two is the caller's job.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use netledger_core::{
    AddressPatch, InventoryAddress, InventoryError, InventoryId, NewAddress, Subnet, SubnetTarget,
};

use crate::client::{format_local, Envelope, IpamClient};

/// Body for `POST subnets/`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubnetBody<'a> {
    pub subnet: String,
    pub mask: String,
    pub description: &'a str,
    pub section_id: &'a str,
}

/// Body for both address writes. `ip` and `subnet_id` are only ever set
/// on creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddressBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub last_seen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<&'a str>,
    #[serde(flatten)]
    pub custom: BTreeMap<&'a str, &'a str>,
}

impl IpamClient {
    /// Create a subnet in the configured section.
    pub async fn add_subnet(&self, target: &SubnetTarget) -> Result<Subnet, InventoryError> {
        let body = SubnetBody {
            subnet: target.network().to_string(),
            mask: target.prefix_len().to_string(),
            description: target.label(),
            section_id: &self.section_id,
        };

        let url = self.build_url("subnets/");
        let envelope = self.send(self.http().post(&url).json(&body)).await?;
        let id = created_id(&envelope)?;

        tracing::info!(cidr = %target, subnet_id = %id, "Subnet created in phpIPAM");

        Ok(Subnet {
            id,
            network: target.network(),
            prefix_len: target.prefix_len(),
            label: target.label().to_string(),
        })
    }

    /// Create an address record. The returned record is assembled from the
    /// request and the id phpIPAM assigned.
    pub async fn add_address(
        &self,
        address: &NewAddress,
    ) -> Result<InventoryAddress, InventoryError> {
        let body = self.new_address_body(address);

        let url = self.build_url("addresses/");
        let envelope = self.send(self.http().post(&url).json(&body)).await?;
        let id = created_id(&envelope)?;

        Ok(InventoryAddress {
            id,
            ip: address.ip,
            subnet_id: address.subnet_id.clone(),
            description: address.description.clone(),
            last_seen: Some(address.last_seen),
            mac_address: address.mac_address.clone(),
            hostname: address.hostname.clone(),
            vendor: address.vendor.clone(),
        })
    }

    /// Partially update an address. Only the patch fields are sent.
    pub async fn patch_address(
        &self,
        id: &InventoryId,
        patch: &AddressPatch,
    ) -> Result<(), InventoryError> {
        let body = self.patch_body(patch);

        let url = self.build_url(&format!("addresses/{id}/"));
        self.send(self.http().patch(&url).json(&body)).await?;
        Ok(())
    }

    pub(crate) fn new_address_body<'a>(&'a self, address: &'a NewAddress) -> AddressBody<'a> {
        AddressBody {
            ip: Some(address.ip.to_string()),
            subnet_id: Some(address.subnet_id.as_str()),
            description: address.description.as_deref(),
            last_seen: format_local(&address.last_seen),
            mac: address.mac_address.as_deref(),
            hostname: address.hostname.as_deref(),
            custom: self.custom_fields(address.vendor.as_deref()),
        }
    }

    pub(crate) fn patch_body<'a>(&'a self, patch: &'a AddressPatch) -> AddressBody<'a> {
        AddressBody {
            ip: None,
            subnet_id: None,
            description: patch.description.as_deref(),
            last_seen: format_local(&patch.last_seen),
            mac: patch.mac_address.as_deref(),
            hostname: patch.hostname.as_deref(),
            custom: self.custom_fields(patch.vendor.as_deref()),
        }
    }

    fn custom_fields<'a>(&'a self, vendor: Option<&'a str>) -> BTreeMap<&'a str, &'a str> {
        let mut custom = BTreeMap::new();
        if let Some(v) = vendor {
            custom.insert(self.vendor_field.as_str(), v);
        }
        custom
    }
}

/// The `id` member phpIPAM returns for a 201.
fn created_id(envelope: &Envelope) -> Result<InventoryId, InventoryError> {
    match &envelope.id {
        Some(Value::String(s)) if !s.is_empty() => Ok(InventoryId::new(s.clone())),
        Some(Value::Number(n)) => Ok(InventoryId::new(n.to_string())),
        _ => Err(InventoryError::InvalidResponse(
            "create response carried no id".to_string(),
        )),
    }
}
