//! CLI entry point for the netledger-discover reconciliation run.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use netledger_core::SubnetTarget;
use netledger_ipam::IpamClient;

use netledger_discover::config::{
    load_discover_config, load_ipam_config, parse_target_arg, ScanProfile,
};
use netledger_discover::scanner::NmapScanner;
use netledger_discover::{DiscoverError, ReconciliationEngine};

#[derive(Parser)]
#[command(name = "netledger-discover")]
#[command(about = "Scan subnets with nmap and reconcile the results into phpIPAM")]
struct Cli {
    /// Subnet to provision and scan, as CIDR[=label]. Repeatable; replaces
    /// the configured targets.
    #[arg(short, long)]
    target: Vec<String>,

    /// Also rescan every subnet already known to the inventory.
    #[arg(long, conflicts_with = "no_sweep")]
    sweep: bool,

    /// Do not rescan known subnets, whatever the config says.
    #[arg(long)]
    no_sweep: bool,

    /// Scan profile: ping, snmp, arp.
    #[arg(short, long)]
    profile: Option<String>,

    /// Config file prefix (default: netledger).
    #[arg(short, long, default_value = "netledger")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut discover_config = load_discover_config(&cli.config)?;
    if let Some(profile) = cli.profile.as_deref() {
        discover_config.profile = parse_profile(profile)?;
    }

    let targets = resolve_targets(&cli, &discover_config)?;
    let sweep_known = if cli.sweep {
        true
    } else if cli.no_sweep {
        false
    } else {
        discover_config.sweep_known_subnets
    };
    if targets.is_empty() && !sweep_known {
        return Err(DiscoverError::NothingToDo.into());
    }

    let ipam_config = load_ipam_config(&cli.config)?;
    let inventory = IpamClient::new(&ipam_config)?;
    tracing::info!(section_id = %ipam_config.section_id, "phpIPAM client ready");

    let scanner = NmapScanner::new(
        &discover_config.nmap_path,
        discover_config.profile.clone(),
        Duration::from_secs(discover_config.scan_timeout_secs),
    );
    let version = scanner.verify_installation().await?;
    let version = version.lines().next().unwrap_or_default().trim();
    tracing::info!(nmap_version = %version, "Nmap verified");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current step");
            on_signal.cancel();
        }
    });

    let engine =
        ReconciliationEngine::new(&discover_config, Arc::new(inventory), Arc::new(scanner));
    let report = engine.run(&targets, sweep_known, &cancel).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.has_errors() {
        tracing::warn!(run_id = %report.run_id, "Run finished with errors");
    }

    Ok(())
}

fn resolve_targets(
    cli: &Cli,
    config: &netledger_discover::config::DiscoverConfig,
) -> anyhow::Result<Vec<SubnetTarget>> {
    if cli.target.is_empty() {
        return Ok(config.subnet_targets()?);
    }
    cli.target
        .iter()
        .map(|raw| parse_target_arg(raw).map_err(Into::into))
        .collect()
}

fn parse_profile(s: &str) -> anyhow::Result<ScanProfile> {
    match s.to_lowercase().as_str() {
        "ping" => Ok(ScanProfile::Ping),
        "snmp" => Ok(ScanProfile::Snmp),
        "arp" => Ok(ScanProfile::Arp),
        _ => anyhow::bail!("Invalid profile: {s}. Choose: ping, snmp, arp"),
    }
}
