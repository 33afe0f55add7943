//! Configuration for the netledger-discover reconciliation run.

use serde::Deserialize;

use netledger_core::{RetryConfig, SubnetTarget};
use netledger_ipam::IpamConfig;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from the `[discover]` section of `netledger.toml` or
/// `NETLEDGER_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Scan profile used for every subnet.
    #[serde(default)]
    pub profile: ScanProfile,

    /// Subnets to provision and scan on every run.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Also rescan every subnet already recorded in the inventory.
    #[serde(default)]
    pub sweep_known_subnets: bool,

    /// What to do with a live host the scan reported without a MAC address.
    #[serde(default)]
    pub incomplete_hosts: IncompleteHostPolicy,

    /// Description written on addresses this tool touches.
    #[serde(default = "default_description")]
    pub description: String,

    /// Upper bound for one nmap run, in seconds.
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,

    /// Backoff for scans and inventory calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// A subnet listed in the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// CIDR target (e.g., "192.168.1.0/24").
    pub cidr: String,

    /// Label stored as the subnet description in the inventory.
    pub name: Option<String>,

    /// Whether this subnet is enabled for scanning.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Predefined scan profiles mapping to nmap flag sets.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanProfile {
    /// Host discovery only: `-sn`
    Ping,
    /// Host discovery plus the SNMP community brute-force script.
    #[default]
    Snmp,
    /// ARP-only discovery for directly attached segments: `-sn -PR`
    Arp,
}

impl ScanProfile {
    /// Return the nmap flags for this profile.
    pub fn nmap_flags(&self) -> Vec<&'static str> {
        match self {
            Self::Ping => vec!["-sn"],
            Self::Snmp => vec!["-sn", "--script=snmp-brute"],
            Self::Arp => vec!["-sn", "-PR"],
        }
    }
}

/// Handling of host blocks that carry an address but never a MAC line.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IncompleteHostPolicy {
    /// Leave them out of the inventory (they are still listed in the report).
    #[default]
    Drop,
    /// Record them with whatever fields were observed.
    Record,
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_description() -> String {
    "Scanned by Nmap".to_string()
}

fn default_scan_timeout() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            profile: ScanProfile::default(),
            targets: Vec::new(),
            sweep_known_subnets: false,
            incomplete_hosts: IncompleteHostPolicy::default(),
            description: default_description(),
            scan_timeout_secs: default_scan_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl DiscoverConfig {
    /// The enabled targets, validated.
    pub fn subnet_targets(&self) -> Result<Vec<SubnetTarget>> {
        let mut targets = Vec::new();
        for t in &self.targets {
            if !t.enabled {
                tracing::info!(cidr = %t.cidr, "Subnet disabled, skipping");
                continue;
            }
            targets.push(SubnetTarget::parse_cidr(&t.cidr, t.name.as_deref())?);
        }
        Ok(targets)
    }
}

/// Parse a `CIDR[=label]` command-line target.
pub fn parse_target_arg(raw: &str) -> Result<SubnetTarget> {
    let (cidr, label) = match raw.split_once('=') {
        Some((cidr, label)) => (cidr, Some(label)),
        None => (raw, None),
    };
    Ok(SubnetTarget::parse_cidr(cidr, label)?)
}

fn build_source(file_prefix: &str) -> Result<config::Config> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("NETLEDGER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| DiscoverError::Config(e.to_string()))
}

fn section<T>(cfg: &config::Config, key: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match cfg.get::<T>(key) {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(DiscoverError::Config(format!("[{key}]: {e}"))),
    }
}

/// Load `[discover]` from `<prefix>.toml` and the environment.
pub fn load_discover_config(file_prefix: &str) -> Result<DiscoverConfig> {
    section(&build_source(file_prefix)?, "discover")
}

/// Load `[ipam]` from `<prefix>.toml` and the environment.
pub fn load_ipam_config(file_prefix: &str) -> Result<IpamConfig> {
    section(&build_source(file_prefix)?, "ipam")
}
