//! Error types for the netledger-discover crate.

use thiserror::Error;

use netledger_core::{InventoryError, TargetError};

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {output}")]
    NmapFailed { code: i32, output: String },

    #[error("Scan of {cidr} timed out after {secs}s")]
    ScanTimeout { cidr: String, secs: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Unrecognized scan output: {0}")]
    MalformedOutput(String),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Nothing to do: no targets configured and sweep of known subnets disabled")]
    NothingToDo,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// Whether repeating the failed step could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NmapFailed { .. } => true,
            Self::Inventory(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Why a target subnet could not be resolved to an inventory id.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Could not create subnet {cidr}: {source}")]
    Create {
        cidr: String,
        #[source]
        source: DiscoverError,
    },

    #[error("Could not list subnets while resolving {cidr}: {source}")]
    Lookup {
        cidr: String,
        #[source]
        source: DiscoverError,
    },

    #[error("Subnet {cidr} reported as existing but not found in inventory")]
    Missing { cidr: String },

    #[error("Run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
