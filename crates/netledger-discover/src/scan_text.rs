//! Parser for nmap's normal (human-readable) output.
//!
//! Host discovery runs print one block per live host:
//!
//! ```text
//! Nmap scan report for printer.lan (192.168.1.20)
//! Host is up (0.0031s latency).
//! MAC Address: 3C:2A:F4:11:22:33 (Brother Industries)
//! ```
//!
//! The parser walks the lines once, keeping a single context for the host
//! block it is inside. A host is emitted the moment both its address and
//! MAC are known; the context is then cleared so nothing carries over into
//! the next block.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use netledger_core::DiscoveredHost;

use crate::config::IncompleteHostPolicy;
use crate::error::{DiscoverError, Result};

static REPORT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Nmap scan report for (.+)").expect("valid regex"));

static PAREN_IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\)").expect("valid regex")
});

static MAC_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"MAC Address:\s*([0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5})(?:\s+\((.+)\))?")
        .expect("valid regex")
});

static MANUFACTURER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Manufacturer:\s*(.+)").expect("valid regex"));

static BANNER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(Starting Nmap|Nmap done)").expect("valid regex"));

/// Hosts pulled out of one scan's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedScan {
    /// Hosts ready to apply, in output order.
    pub hosts: Vec<DiscoveredHost>,
    /// Live hosts that never showed a MAC address and were left out.
    pub dropped: Vec<Ipv4Addr>,
}

/// Fields observed so far for the host block being read.
#[derive(Debug, Default)]
struct ParseContext {
    address: Option<Ipv4Addr>,
    hostname: Option<String>,
    mac: Option<String>,
    vendor: Option<String>,
}

impl ParseContext {
    /// Begin a block from the text after "Nmap scan report for".
    fn start(target: &str) -> Self {
        let target = target.trim();
        let (address, hostname) = match PAREN_IPV4.captures(target) {
            Some(caps) => {
                let ip = caps[1].parse().ok();
                let name = target.replace(&caps[0], "").trim().to_string();
                (ip, Some(name))
            }
            None => (target.parse().ok(), None),
        };

        Self {
            address,
            hostname: hostname.filter(|h| !h.is_empty()),
            mac: None,
            vendor: None,
        }
    }

    fn is_complete(&self) -> bool {
        self.address.is_some() && self.mac.is_some()
    }

    /// Turn the context into a host and reset it.
    fn take(&mut self, observed_at: DateTime<Utc>) -> Option<DiscoveredHost> {
        let ctx = std::mem::take(self);
        Some(DiscoveredHost {
            address: ctx.address?,
            hostname: ctx.hostname,
            mac_address: ctx.mac,
            vendor: ctx.vendor,
            observed_at,
        })
    }
}

/// Line-oriented nmap output parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOutputParser {
    policy: IncompleteHostPolicy,
}

impl ScanOutputParser {
    pub fn new(policy: IncompleteHostPolicy) -> Self {
        Self { policy }
    }

    /// Parse raw nmap output. Every emitted host carries `observed_at`.
    ///
    /// Unrelated lines are skipped. Output that is non-blank yet contains
    /// no nmap line at all is reported as malformed.
    pub fn parse(&self, raw: &str, observed_at: DateTime<Utc>) -> Result<ParsedScan> {
        let mut parsed = ParsedScan::default();
        let mut ctx = ParseContext::default();
        let mut recognized = false;

        for line in raw.lines() {
            if let Some(caps) = REPORT_LINE.captures(line) {
                recognized = true;
                self.close_block(&mut ctx, &mut parsed, observed_at);
                ctx = ParseContext::start(&caps[1]);
            } else if let Some(caps) = MAC_LINE.captures(line) {
                ctx.mac = Some(caps[1].to_ascii_uppercase());
                if ctx.vendor.is_none() {
                    ctx.vendor = caps
                        .get(2)
                        .map(|m| m.as_str().trim())
                        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("unknown"))
                        .map(String::from);
                }
            } else if let Some(caps) = MANUFACTURER_LINE.captures(line) {
                let vendor = caps[1].trim();
                if !vendor.is_empty() {
                    ctx.vendor = Some(vendor.to_string());
                }
            } else if BANNER_LINE.is_match(line) {
                recognized = true;
            }

            if ctx.is_complete() {
                parsed.hosts.extend(ctx.take(observed_at));
            }
        }
        self.close_block(&mut ctx, &mut parsed, observed_at);

        if !recognized && !raw.trim().is_empty() {
            let first = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
            return Err(DiscoverError::MalformedOutput(
                first.chars().take(200).collect(),
            ));
        }

        Ok(parsed)
    }

    /// A block ends without ever seeing a MAC: apply the policy.
    fn close_block(
        &self,
        ctx: &mut ParseContext,
        parsed: &mut ParsedScan,
        observed_at: DateTime<Utc>,
    ) {
        let Some(address) = ctx.address else {
            *ctx = ParseContext::default();
            return;
        };

        match self.policy {
            IncompleteHostPolicy::Drop => {
                tracing::debug!(ip = %address, "Host reported without MAC, dropping");
                parsed.dropped.push(address);
                *ctx = ParseContext::default();
            }
            IncompleteHostPolicy::Record => {
                parsed.hosts.extend(ctx.take(observed_at));
            }
        }
    }
}
