use std::net::Ipv4Addr;

use thiserror::Error;

/// Errors returned by an inventory backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Inventory unreachable: {0}")]
    Transport(String),

    #[error("Inventory request timed out: {0}")]
    Timeout(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Inventory rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid inventory response: {0}")]
    InvalidResponse(String),

    #[error("Inventory configuration error: {0}")]
    Config(String),
}

impl InventoryError {
    /// Whether the same call may succeed if issued again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors building a [`SubnetTarget`](crate::types::SubnetTarget).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("Invalid CIDR: {cidr}")]
    InvalidCidr { cidr: String },

    #[error("Prefix length {prefix_len} is out of range (0-32)")]
    PrefixLength { prefix_len: u8 },

    #[error("{cidr} is not a network base address (expected {expected})")]
    NotNetworkBase { cidr: String, expected: Ipv4Addr },
}
