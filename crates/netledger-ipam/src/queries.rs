//! Read operations against the phpIPAM `subnets` and `addresses` controllers.

use std::net::Ipv4Addr;

use serde::Deserialize;
use serde_json::Value;

use netledger_core::{InventoryAddress, InventoryError, InventoryId, Subnet};

use crate::client::{parse_local, Envelope, IpamClient};

/// A row from `GET subnets/`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubnetRow {
    pub id: InventoryId,
    pub subnet: Option<String>,
    pub mask: Option<Value>,
    pub description: Option<String>,
}

/// A row from `GET addresses/search/<ip>/`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AddressRow {
    pub id: InventoryId,
    #[serde(rename = "subnetId")]
    pub subnet_id: InventoryId,
    pub ip: String,
    pub description: Option<String>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    #[serde(rename = "lastSeen")]
    pub last_seen: Option<String>,
    /// Custom fields (`custom_*`) and anything else phpIPAM returns.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl IpamClient {
    /// All IPv4 subnets known to phpIPAM. Folders and IPv6 subnets are
    /// skipped.
    pub async fn fetch_subnets(&self) -> Result<Vec<Subnet>, InventoryError> {
        let url = self.build_url("subnets/");
        let envelope = match self.send(self.http().get(&url)).await {
            Ok(env) => env,
            Err(InventoryError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let rows: Vec<SubnetRow> = decode_data(envelope)?;
        let total = rows.len();
        let subnets: Vec<Subnet> = rows.into_iter().filter_map(subnet_from_row).collect();

        tracing::debug!(total, ipv4 = subnets.len(), "Fetched subnets from phpIPAM");
        Ok(subnets)
    }

    /// Search for an address by IP. phpIPAM answers a miss with either a
    /// 404 or an empty result set.
    pub async fn search_address(
        &self,
        ip: Ipv4Addr,
    ) -> Result<Option<InventoryAddress>, InventoryError> {
        let url = self.build_url(&format!("addresses/search/{ip}/"));
        let envelope = match self.send(self.http().get(&url)).await {
            Ok(env) => env,
            Err(InventoryError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let rows: Vec<AddressRow> = decode_data(envelope)?;
        match rows.into_iter().next() {
            Some(row) => address_from_row(row, &self.vendor_field).map(Some),
            None => Ok(None),
        }
    }
}

/// Deserialize the envelope's `data` member, treating a missing one as an
/// empty list.
fn decode_data<T: serde::de::DeserializeOwned>(
    envelope: Envelope,
) -> Result<Vec<T>, InventoryError> {
    match envelope.data {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(data) => serde_json::from_value(data)
            .map_err(|e| InventoryError::InvalidResponse(e.to_string())),
    }
}

pub(crate) fn subnet_from_row(row: SubnetRow) -> Option<Subnet> {
    let network: Ipv4Addr = row.subnet.as_deref()?.trim().parse().ok()?;
    let prefix_len = row.mask.as_ref().and_then(mask_value)?;
    if prefix_len > 32 {
        return None;
    }

    let label = non_empty(row.description).unwrap_or_else(|| format!("{network}/{prefix_len}"));
    Some(Subnet {
        id: row.id,
        network,
        prefix_len,
        label,
    })
}

fn mask_value(v: &Value) -> Option<u8> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|m| u8::try_from(m).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn address_from_row(
    mut row: AddressRow,
    vendor_field: &str,
) -> Result<InventoryAddress, InventoryError> {
    let ip: Ipv4Addr = row.ip.trim().parse().map_err(|_| {
        InventoryError::InvalidResponse(format!("address {} has non-IPv4 ip {}", row.id, row.ip))
    })?;

    let vendor = match row.extra.remove(vendor_field) {
        Some(Value::String(s)) => non_empty(Some(s)),
        _ => None,
    };

    Ok(InventoryAddress {
        id: row.id,
        ip,
        subnet_id: row.subnet_id,
        description: non_empty(row.description),
        last_seen: row.last_seen.as_deref().and_then(parse_local),
        mac_address: non_empty(row.mac),
        hostname: non_empty(row.hostname),
        vendor,
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}
