//! Run-level report of a reconciliation pass.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Where a target came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Explicit,
    Sweep,
}

/// What provisioning did for an explicit target.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The subnet was created by this run.
    Created,
    /// Creation was refused as a duplicate; the existing subnet was used.
    AlreadyExists,
    /// Creation failed for another reason but the subnet was found anyway.
    Recovered,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Scanned,
    Skipped,
    Errored,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HostOutcome {
    Created,
    Updated,
    Failed,
}

/// Result of applying one discovered host.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HostReport {
    pub ip: Ipv4Addr,
    pub outcome: HostOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of processing one subnet.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TargetReport {
    pub cidr: String,
    pub label: String,
    pub source: TargetSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning: Option<ProvisionOutcome>,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub hosts: Vec<HostReport>,
    /// Live hosts left out because no MAC address was observed.
    pub dropped_incomplete: Vec<Ipv4Addr>,
}

impl TargetReport {
    pub fn new(cidr: String, label: String, source: TargetSource) -> Self {
        Self {
            cidr,
            label,
            source,
            subnet_id: None,
            provisioning: None,
            status: TargetStatus::Scanned,
            error: None,
            hosts: Vec::new(),
            dropped_incomplete: Vec::new(),
        }
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = TargetStatus::Skipped;
        self.error = Some(reason.into());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TargetStatus::Errored;
        self.error = Some(error.into());
    }

    fn count(&self, outcome: HostOutcome) -> u32 {
        self.hosts.iter().filter(|h| h.outcome == outcome).count() as u32
    }
}

/// Totals across all targets.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub targets_scanned: u32,
    pub targets_skipped: u32,
    pub targets_errored: u32,
    pub hosts_created: u32,
    pub hosts_updated: u32,
    pub hosts_failed: u32,
    pub hosts_dropped: u32,
}

/// Everything one reconciliation pass did.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub targets: Vec<TargetReport>,
    /// Set when listing known subnets for the sweep failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_error: Option<String>,
    pub summary: RunSummary,
}

impl ReconciliationReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            targets: Vec::new(),
            sweep_error: None,
            summary: RunSummary::default(),
        }
    }

    /// Stamp the finish time and compute the summary.
    pub fn finish(&mut self) {
        let mut s = RunSummary::default();
        for t in &self.targets {
            match t.status {
                TargetStatus::Scanned => s.targets_scanned += 1,
                TargetStatus::Skipped => s.targets_skipped += 1,
                TargetStatus::Errored => s.targets_errored += 1,
            }
            s.hosts_created += t.count(HostOutcome::Created);
            s.hosts_updated += t.count(HostOutcome::Updated);
            s.hosts_failed += t.count(HostOutcome::Failed);
            s.hosts_dropped += t.dropped_incomplete.len() as u32;
        }
        self.summary = s;
        self.finished_at = Some(Utc::now());
    }

    /// True when any target or host failed, or the sweep listing failed.
    pub fn has_errors(&self) -> bool {
        self.sweep_error.is_some()
            || self.summary.targets_errored > 0
            || self.summary.hosts_failed > 0
    }
}

impl Default for ReconciliationReport {
    fn default() -> Self {
        Self::new()
    }
}
