//! In-memory inventory and canned scanner shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use netledger_core::{
    AddressPatch, InventoryAddress, InventoryClient, InventoryError, InventoryId, NewAddress,
    Subnet, SubnetTarget,
};
use netledger_discover::config::{DiscoverConfig, IncompleteHostPolicy};
use netledger_discover::scanner::{ScanOutput, ScanRunner};
use netledger_discover::{DiscoverError, Result};

/// Behaves like phpIPAM for the calls the engine makes.
#[derive(Default)]
pub struct MemoryInventory {
    pub subnets: RwLock<Vec<Subnet>>,
    pub addresses: RwLock<HashMap<Ipv4Addr, InventoryAddress>>,
    /// Every patch applied, in order.
    pub patches: RwLock<Vec<(InventoryId, AddressPatch)>>,
    /// IPs whose create/update calls fail with a rejection.
    pub reject_ips: RwLock<Vec<Ipv4Addr>>,
    pub fail_listing: RwLock<bool>,
    /// Number of address creates that are stored but answer with a timeout.
    pub lost_create_responses: AtomicU32,
    next_id: AtomicU32,
    pub list_calls: AtomicU32,
    pub subnet_creates: AtomicU32,
    pub address_creates: AtomicU32,
    pub address_updates: AtomicU32,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(100),
            ..Default::default()
        }
    }

    pub fn with_subnet(self, id: &str, cidr: &str, label: &str) -> Self {
        let target = SubnetTarget::parse_cidr(cidr, Some(label)).unwrap();
        self.subnets.write().unwrap().push(Subnet {
            id: InventoryId::new(id),
            network: target.network(),
            prefix_len: target.prefix_len(),
            label: label.to_string(),
        });
        self
    }

    pub fn reject(&self, ip: Ipv4Addr) {
        self.reject_ips.write().unwrap().push(ip);
    }

    pub fn address(&self, ip: Ipv4Addr) -> Option<InventoryAddress> {
        self.addresses.read().unwrap().get(&ip).cloned()
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> InventoryId {
        InventoryId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    fn check_rejected(&self, ip: Ipv4Addr) -> std::result::Result<(), InventoryError> {
        if self.reject_ips.read().unwrap().contains(&ip) {
            return Err(InventoryError::Rejected {
                status: 400,
                message: format!("IP address {ip} refused"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryClient for MemoryInventory {
    async fn list_subnets(&self) -> std::result::Result<Vec<Subnet>, InventoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_listing.read().unwrap() {
            return Err(InventoryError::Rejected {
                status: 403,
                message: "Unauthorized".into(),
            });
        }
        Ok(self.subnets.read().unwrap().clone())
    }

    async fn create_subnet(
        &self,
        target: &SubnetTarget,
    ) -> std::result::Result<Subnet, InventoryError> {
        self.subnet_creates.fetch_add(1, Ordering::SeqCst);
        let mut subnets = self.subnets.write().unwrap();
        if subnets.iter().any(|s| s.matches(target)) {
            return Err(InventoryError::Conflict("Subnet already exists".into()));
        }
        let subnet = Subnet {
            id: self.next_id(),
            network: target.network(),
            prefix_len: target.prefix_len(),
            label: target.label().to_string(),
        };
        subnets.push(subnet.clone());
        Ok(subnet)
    }

    async fn find_address(
        &self,
        ip: Ipv4Addr,
    ) -> std::result::Result<Option<InventoryAddress>, InventoryError> {
        Ok(self.address(ip))
    }

    async fn create_address(
        &self,
        new: &NewAddress,
    ) -> std::result::Result<InventoryAddress, InventoryError> {
        self.address_creates.fetch_add(1, Ordering::SeqCst);
        self.check_rejected(new.ip)?;
        let mut addresses = self.addresses.write().unwrap();
        if addresses.contains_key(&new.ip) {
            return Err(InventoryError::Conflict("IP address already exists".into()));
        }
        let record = InventoryAddress {
            id: self.next_id(),
            ip: new.ip,
            subnet_id: new.subnet_id.clone(),
            description: new.description.clone(),
            last_seen: Some(new.last_seen),
            mac_address: new.mac_address.clone(),
            hostname: new.hostname.clone(),
            vendor: new.vendor.clone(),
        };
        addresses.insert(new.ip, record.clone());

        let lost = self
            .lost_create_responses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if lost.is_ok() {
            return Err(InventoryError::Timeout("response lost".into()));
        }
        Ok(record)
    }

    async fn update_address(
        &self,
        id: &InventoryId,
        patch: &AddressPatch,
    ) -> std::result::Result<(), InventoryError> {
        self.address_updates.fetch_add(1, Ordering::SeqCst);
        let mut addresses = self.addresses.write().unwrap();
        let record = addresses
            .values_mut()
            .find(|a| &a.id == id)
            .ok_or_else(|| InventoryError::NotFound(format!("address {id}")))?;
        self.check_rejected(record.ip)?;

        record.last_seen = Some(patch.last_seen);
        if let Some(v) = &patch.description {
            record.description = Some(v.clone());
        }
        if let Some(v) = &patch.mac_address {
            record.mac_address = Some(v.clone());
        }
        if let Some(v) = &patch.hostname {
            record.hostname = Some(v.clone());
        }
        if let Some(v) = &patch.vendor {
            record.vendor = Some(v.clone());
        }
        self.patches.write().unwrap().push((id.clone(), patch.clone()));
        Ok(())
    }
}

/// Outcome of a canned scan.
#[derive(Clone)]
pub enum Canned {
    Text(String),
    ExitCode(i32),
}

/// Returns pre-recorded output per CIDR; unknown CIDRs scan as empty.
#[derive(Default)]
pub struct CannedScanner {
    pub outputs: RwLock<HashMap<String, Canned>>,
    pub scanned: RwLock<Vec<String>>,
    /// Cancel this token after the first scan completes.
    pub cancel_after_first: RwLock<Option<CancellationToken>>,
}

impl CannedScanner {
    pub fn with(self, cidr: &str, output: Canned) -> Self {
        self.outputs.write().unwrap().insert(cidr.to_string(), output);
        self
    }

    pub fn scanned(&self) -> Vec<String> {
        self.scanned.read().unwrap().clone()
    }
}

#[async_trait]
impl ScanRunner for CannedScanner {
    async fn scan(&self, cidr: &str, cancel: &CancellationToken) -> Result<ScanOutput> {
        if cancel.is_cancelled() {
            return Err(DiscoverError::Cancelled);
        }
        self.scanned.write().unwrap().push(cidr.to_string());
        let canned = self.outputs.read().unwrap().get(cidr).cloned();
        if let Some(token) = self.cancel_after_first.read().unwrap().as_ref() {
            token.cancel();
        }
        let text = match canned {
            Some(Canned::Text(text)) => text,
            Some(Canned::ExitCode(code)) => {
                return Err(DiscoverError::NmapFailed {
                    code,
                    output: "Failed to resolve target".into(),
                })
            }
            None => "Starting Nmap 7.94\nNmap done: 256 IP addresses (0 hosts up)\n".to_string(),
        };
        Ok(ScanOutput {
            scan_id: Uuid::new_v4(),
            cidr: cidr.to_string(),
            text,
            duration: Duration::from_millis(5),
        })
    }
}

/// Scanner that answers `cidr` with `text`.
pub fn canned(cidr: &str, text: &str) -> Arc<CannedScanner> {
    let output = Canned::Text(text.to_string());
    Arc::new(CannedScanner::default().with(cidr, output))
}

/// Config with a near-instant retry schedule.
pub fn fast_config(policy: IncompleteHostPolicy) -> DiscoverConfig {
    let mut config = DiscoverConfig::default();
    config.incomplete_hosts = policy;
    config.retry.max_attempts = 2;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    config
}

pub fn target(cidr: &str, label: &str) -> SubnetTarget {
    SubnetTarget::parse_cidr(cidr, Some(label)).unwrap()
}
