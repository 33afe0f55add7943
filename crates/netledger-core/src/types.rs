//! Core domain types for discovery-to-inventory reconciliation.
//!
//! These types describe the subnets we scan, the hosts a scan turns up,
//! and the inventory-side records those hosts are reconciled into.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TargetError;

// ── Identity ──────────────────────────────────────────────────────

/// Opaque identifier assigned by the inventory service.
///
/// phpIPAM hands ids back as JSON strings in some endpoints and as numbers
/// in others, so both deserialize into the same value.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InventoryId(pub String);

impl InventoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InventoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for InventoryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

// ── Subnets ───────────────────────────────────────────────────────

/// A network segment to provision and scan.
///
/// The network address is always the canonical base for its prefix.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubnetTarget {
    network: Ipv4Addr,
    prefix_len: u8,
    label: String,
}

impl SubnetTarget {
    /// Build a target, rejecting prefixes over 32 and addresses with host
    /// bits set.
    pub fn new(
        network: Ipv4Addr,
        prefix_len: u8,
        label: impl Into<String>,
    ) -> Result<Self, TargetError> {
        let net = Ipv4Net::new(network, prefix_len).map_err(|_| TargetError::PrefixLength {
            prefix_len,
        })?;
        if net.network() != network {
            return Err(TargetError::NotNetworkBase {
                cidr: format!("{network}/{prefix_len}"),
                expected: net.network(),
            });
        }

        Ok(Self {
            network,
            prefix_len,
            label: label.into(),
        })
    }

    /// Parse `a.b.c.d/n`. The label defaults to the CIDR itself when empty.
    pub fn parse_cidr(cidr: &str, label: Option<&str>) -> Result<Self, TargetError> {
        let net: Ipv4Net = cidr.trim().parse().map_err(|_| TargetError::InvalidCidr {
            cidr: cidr.to_string(),
        })?;
        let label = match label.map(str::trim) {
            Some(l) if !l.is_empty() => l.to_string(),
            _ => net.to_string(),
        };
        Self::new(net.addr(), net.prefix_len(), label)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// CIDR notation as handed to the scanner.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.network, self.prefix_len)
    }
}

impl fmt::Display for SubnetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// A subnet as recorded by the inventory service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subnet {
    pub id: InventoryId,
    pub network: Ipv4Addr,
    pub prefix_len: u8,
    pub label: String,
}

impl Subnet {
    /// Identity is (network, prefix length). Labels may repeat or change.
    pub fn matches(&self, target: &SubnetTarget) -> bool {
        self.network == target.network() && self.prefix_len == target.prefix_len()
    }

    pub fn cidr(&self) -> String {
        format!("{}/{}", self.network, self.prefix_len)
    }
}

// ── Hosts ─────────────────────────────────────────────────────────

/// A host seen during one scan pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredHost {
    pub address: Ipv4Addr,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub vendor: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// An address record held by the inventory service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryAddress {
    pub id: InventoryId,
    pub ip: Ipv4Addr,
    pub subnet_id: InventoryId,
    pub description: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}

/// Fields sent when an address is created.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewAddress {
    pub ip: Ipv4Addr,
    pub subnet_id: InventoryId,
    pub description: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}

/// Fields sent when an existing address is refreshed.
///
/// There is deliberately no ip or subnet field: an update can never move
/// an address.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AddressPatch {
    pub last_seen: DateTime<Utc>,
    pub description: Option<String>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}
