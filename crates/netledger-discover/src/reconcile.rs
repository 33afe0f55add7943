//! Reconciliation run: provision, scan, parse and upsert, subnet by subnet.
//!
//! Failures are contained at the smallest unit that can carry them. A
//! subnet that cannot be provisioned or scanned is recorded and skipped;
//! a host the inventory refuses is recorded and the rest of its subnet
//! still proceeds. Only an empty run is fatal.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use netledger_core::{
    AddressPatch, DiscoveredHost, InventoryAddress, InventoryClient, InventoryError, InventoryId,
    NewAddress, Subnet, SubnetTarget,
};

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, ProvisionError, Result};
use crate::provision::SubnetProvisioner;
use crate::report::{
    HostOutcome, HostReport, ReconciliationReport, TargetReport, TargetSource,
};
use crate::retry::RetryPolicy;
use crate::scan_text::ScanOutputParser;
use crate::scanner::ScanRunner;

const CANCELLED: &str = "cancelled";

/// Drives one reconciliation pass against an inventory.
pub struct ReconciliationEngine {
    inventory: Arc<dyn InventoryClient>,
    scanner: Arc<dyn ScanRunner>,
    provisioner: SubnetProvisioner,
    parser: ScanOutputParser,
    retry: RetryPolicy,
    description: String,
}

impl ReconciliationEngine {
    pub fn new(
        config: &DiscoverConfig,
        inventory: Arc<dyn InventoryClient>,
        scanner: Arc<dyn ScanRunner>,
    ) -> Self {
        let retry = RetryPolicy::new(&config.retry);
        Self {
            provisioner: SubnetProvisioner::new(inventory.clone(), retry.clone()),
            inventory,
            scanner,
            parser: ScanOutputParser::new(config.incomplete_hosts),
            retry,
            description: config.description.clone(),
        }
    }

    /// Reconcile every explicit target, then every subnet already known to
    /// the inventory when `sweep_known` is set.
    ///
    /// Returns the partial report when `cancel` fires mid-run.
    pub async fn run(
        &self,
        targets: &[SubnetTarget],
        sweep_known: bool,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationReport> {
        if targets.is_empty() && !sweep_known {
            return Err(DiscoverError::NothingToDo);
        }

        let mut report = ReconciliationReport::new();
        tracing::info!(
            run_id = %report.run_id,
            targets = targets.len(),
            sweep_known,
            "Starting reconciliation run"
        );

        for target in targets {
            let report_entry = self.reconcile_target(target, cancel).await;
            report.targets.push(report_entry);
        }

        if sweep_known {
            self.sweep(&mut report, cancel).await;
        }

        report.finish();
        tracing::info!(
            run_id = %report.run_id,
            scanned = report.summary.targets_scanned,
            skipped = report.summary.targets_skipped,
            errored = report.summary.targets_errored,
            created = report.summary.hosts_created,
            updated = report.summary.hosts_updated,
            failed = report.summary.hosts_failed,
            dropped = report.summary.hosts_dropped,
            "Reconciliation run complete"
        );

        Ok(report)
    }

    async fn reconcile_target(
        &self,
        target: &SubnetTarget,
        cancel: &CancellationToken,
    ) -> TargetReport {
        let mut entry = TargetReport::new(
            target.cidr(),
            target.label().to_string(),
            TargetSource::Explicit,
        );

        if cancel.is_cancelled() {
            entry.skip(CANCELLED);
            return entry;
        }

        match self.provisioner.ensure(target, cancel).await {
            Ok(provisioned) => {
                tracing::info!(
                    cidr = %target,
                    subnet_id = %provisioned.subnet.id,
                    outcome = ?provisioned.outcome,
                    "Subnet provisioned"
                );
                entry.subnet_id = Some(provisioned.subnet.id.to_string());
                entry.provisioning = Some(provisioned.outcome);
                self.scan_and_apply(&provisioned.subnet.id, &mut entry, cancel)
                    .await;
            }
            Err(ProvisionError::Cancelled) => entry.skip(CANCELLED),
            Err(e) => {
                tracing::warn!(cidr = %target, error = %e, "Subnet unavailable, skipping");
                entry.skip(e.to_string());
            }
        }

        entry
    }

    /// Rescan the subnets the inventory already holds, using their ids as-is.
    async fn sweep(&self, report: &mut ReconciliationReport, cancel: &CancellationToken) {
        let inventory = self.inventory.as_ref();
        let listed = self
            .retry
            .run("list_subnets", cancel, move || async move {
                inventory.list_subnets().await.map_err(DiscoverError::from)
            })
            .await;

        let subnets: Vec<Subnet> = match listed {
            Ok(subnets) => subnets,
            Err(DiscoverError::Cancelled) => {
                tracing::info!("Run cancelled, sweep of known subnets skipped");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not list known subnets, sweep skipped");
                report.sweep_error = Some(e.to_string());
                return;
            }
        };

        tracing::info!(subnets = subnets.len(), "Sweeping known subnets");

        for subnet in subnets {
            let mut entry =
                TargetReport::new(subnet.cidr(), subnet.label.clone(), TargetSource::Sweep);
            entry.subnet_id = Some(subnet.id.to_string());
            if cancel.is_cancelled() {
                entry.skip(CANCELLED);
            } else {
                self.scan_and_apply(&subnet.id, &mut entry, cancel).await;
            }
            report.targets.push(entry);
        }
    }

    async fn scan_and_apply(
        &self,
        subnet_id: &InventoryId,
        entry: &mut TargetReport,
        cancel: &CancellationToken,
    ) {
        let scanner = self.scanner.as_ref();
        let cidr = entry.cidr.clone();
        let cidr_ref = cidr.as_str();
        let output = match self
            .retry
            .run("scan", cancel, move || async move {
                scanner.scan(cidr_ref, cancel).await
            })
            .await
        {
            Ok(output) => output,
            Err(DiscoverError::Cancelled) => {
                entry.skip(CANCELLED);
                return;
            }
            Err(e) => {
                tracing::warn!(cidr = %cidr, error = %e, "Scan failed");
                entry.fail(e.to_string());
                return;
            }
        };

        let parsed = match self.parser.parse(&output.text, Utc::now()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    cidr = %cidr,
                    scan_id = %output.scan_id,
                    error = %e,
                    "Scan output rejected"
                );
                entry.fail(e.to_string());
                return;
            }
        };

        tracing::info!(
            cidr = %cidr,
            scan_id = %output.scan_id,
            hosts = parsed.hosts.len(),
            dropped = parsed.dropped.len(),
            "Scan parsed"
        );
        entry.dropped_incomplete = parsed.dropped;

        for host in &parsed.hosts {
            if cancel.is_cancelled() {
                // Hosts already applied stay in the report.
                entry.skip(format!(
                    "{CANCELLED} after {} of {} hosts",
                    entry.hosts.len(),
                    parsed.hosts.len()
                ));
                break;
            }

            let host_report = match self.apply_host(subnet_id, host, cancel).await {
                Ok(outcome) => HostReport {
                    ip: host.address,
                    outcome,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(
                        ip = %host.address,
                        cidr = %cidr,
                        error = %e,
                        "Host not recorded"
                    );
                    HostReport {
                        ip: host.address,
                        outcome: HostOutcome::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };
            entry.hosts.push(host_report);
        }
    }

    /// Upsert one host keyed by its IP. An existing record is patched in
    /// place; its address and subnet are never touched.
    pub async fn apply_host(
        &self,
        subnet_id: &InventoryId,
        host: &DiscoveredHost,
        cancel: &CancellationToken,
    ) -> Result<HostOutcome> {
        let inventory = self.inventory.as_ref();
        let ip = host.address;

        let existing = self
            .retry
            .run("find_address", cancel, move || async move {
                inventory
                    .find_address(ip)
                    .await
                    .map_err(DiscoverError::from)
            })
            .await?;

        match existing {
            Some(current) => {
                self.update_existing(&current, subnet_id, host, cancel)
                    .await?;
                Ok(HostOutcome::Updated)
            }
            None => {
                let new = new_address(subnet_id, host, &self.description);
                let new = &new;
                let created = self
                    .retry
                    .run("create_address", cancel, move || async move {
                        inventory
                            .create_address(new)
                            .await
                            .map_err(DiscoverError::from)
                    })
                    .await;

                match created {
                    Ok(record) => {
                        tracing::debug!(ip = %ip, address_id = %record.id, "Address created");
                        Ok(HostOutcome::Created)
                    }
                    // An earlier attempt may have been stored before its
                    // response was lost; the retry then collides with it.
                    Err(DiscoverError::Inventory(InventoryError::Conflict(message))) => {
                        tracing::info!(
                            ip = %ip,
                            message = %message,
                            "Address appeared during create, updating instead"
                        );
                        let current = self
                            .retry
                            .run("find_address", cancel, move || async move {
                                inventory
                                    .find_address(ip)
                                    .await
                                    .map_err(DiscoverError::from)
                            })
                            .await?
                            .ok_or(DiscoverError::Inventory(InventoryError::Conflict(message)))?;
                        self.update_existing(&current, subnet_id, host, cancel)
                            .await?;
                        Ok(HostOutcome::Updated)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn update_existing(
        &self,
        current: &InventoryAddress,
        subnet_id: &InventoryId,
        host: &DiscoveredHost,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if &current.subnet_id != subnet_id {
            tracing::debug!(
                ip = %current.ip,
                recorded_subnet = %current.subnet_id,
                scanned_subnet = %subnet_id,
                "Address recorded under another subnet, keeping it there"
            );
        }

        let inventory = self.inventory.as_ref();
        let patch = address_patch(host, &self.description);
        let (id, patch) = (&current.id, &patch);
        self.retry
            .run("update_address", cancel, move || async move {
                inventory
                    .update_address(id, patch)
                    .await
                    .map_err(DiscoverError::from)
            })
            .await?;
        tracing::debug!(ip = %current.ip, address_id = %current.id, "Address updated");
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn new_address(subnet_id: &InventoryId, host: &DiscoveredHost, description: &str) -> NewAddress {
    NewAddress {
        ip: host.address,
        subnet_id: subnet_id.clone(),
        description: non_empty(Some(description)),
        last_seen: host.observed_at,
        mac_address: non_empty(host.mac_address.as_deref()),
        hostname: non_empty(host.hostname.as_deref()),
        vendor: non_empty(host.vendor.as_deref()),
    }
}

fn address_patch(host: &DiscoveredHost, description: &str) -> AddressPatch {
    AddressPatch {
        last_seen: host.observed_at,
        description: non_empty(Some(description)),
        mac_address: non_empty(host.mac_address.as_deref()),
        hostname: non_empty(host.hostname.as_deref()),
        vendor: non_empty(host.vendor.as_deref()),
    }
}
