//! Nmap process wrapper.
//!
//! Executes nmap as a child process via `tokio::process::Command` and hands
//! back its text output. Parsing lives in [`crate::scan_text`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ScanProfile;
use crate::error::{DiscoverError, Result};

/// Raw result of one scan invocation.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    /// Unique ID for this scan run.
    pub scan_id: Uuid,
    /// The CIDR that was scanned.
    pub cidr: String,
    /// Everything the scanner printed, stdout then stderr.
    pub text: String,
    /// Wall-clock duration of the scan.
    pub duration: Duration,
}

/// Something that can scan a CIDR and return text output.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    async fn scan(&self, cidr: &str, cancel: &CancellationToken) -> Result<ScanOutput>;
}

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
    profile: ScanProfile,
    timeout: Duration,
}

impl NmapScanner {
    pub fn new(nmap_path: &str, profile: ScanProfile, timeout: Duration) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
            profile,
            timeout,
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn command(&self, cidr: &str) -> Command {
        let mut cmd = Command::new(&self.nmap_path);
        cmd.args(self.profile.nmap_flags())
            .arg(cidr)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ScanRunner for NmapScanner {
    /// Run nmap against `cidr`. The child is killed when the timeout
    /// elapses or the token is cancelled.
    async fn scan(&self, cidr: &str, cancel: &CancellationToken) -> Result<ScanOutput> {
        let scan_id = Uuid::new_v4();
        let start = Instant::now();

        tracing::info!(
            scan_id = %scan_id,
            cidr = %cidr,
            profile = ?self.profile,
            "Starting nmap scan"
        );

        let run = tokio::time::timeout(self.timeout, self.command(cidr).output());
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoverError::Cancelled),
            res = run => match res {
                Err(_) => {
                    return Err(DiscoverError::ScanTimeout {
                        cidr: cidr.to_string(),
                        secs: self.timeout.as_secs(),
                    })
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(DiscoverError::NmapNotFound {
                        path: self.nmap_path.clone(),
                    })
                }
                Ok(Err(e)) => return Err(DiscoverError::Io(e)),
                Ok(Ok(output)) => output,
            },
        };

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(DiscoverError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                output: detail.trim().chars().take(500).collect(),
            });
        }

        let mut text = stdout.into_owned();
        if !stderr.trim().is_empty() {
            text.push('\n');
            text.push_str(&stderr);
        }

        tracing::info!(
            scan_id = %scan_id,
            cidr = %cidr,
            duration_ms = duration.as_millis(),
            "Nmap scan complete"
        );

        Ok(ScanOutput {
            scan_id,
            cidr: cidr.to_string(),
            text,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args() {
        let scanner = NmapScanner::new("nmap", ScanProfile::Snmp, Duration::from_secs(60));
        let cmd = scanner.command("192.168.1.0/24");
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["-sn", "--script=snmp-brute", "192.168.1.0/24"]);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let scanner = NmapScanner::new(
            "/nonexistent/netledger-nmap",
            ScanProfile::Ping,
            Duration::from_secs(5),
        );
        let err = scanner
            .scan("10.0.0.0/30", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::NmapNotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let scanner = NmapScanner::new(
            "/nonexistent/netledger-nmap",
            ScanProfile::Ping,
            Duration::from_secs(5),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = scanner.scan("10.0.0.0/30", &cancel).await.unwrap_err();
        // Either branch may win the select when both are immediately ready.
        assert!(matches!(
            err,
            DiscoverError::Cancelled | DiscoverError::NmapNotFound { .. }
        ));
    }
}
