//! Error types for node orchestration

use thiserror::Error;

/// Orchestrator error types
#[derive(Debug, Error)]
pub enum WardenError {
    /// Chain id not present in the registry
    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    /// Chain has no versions registered
    #[error("No releases configured for {0}")]
    NoReleases(String),

    /// Host OS/architecture has no platform key
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("No release for {chain} {version} ({platform})")]
    NoReleaseForPlatform {
        chain: String,
        version: String,
        platform: String,
    },

    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("SHA256 mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Extraction of {path} failed: {reason}")]
    ExtractFailed { path: String, reason: String },

    /// Owner already runs a node for this chain
    #[error("Only one node per chain is allowed. {0} already exists.")]
    ChainConflict(String),

    /// Node id already taken by some owner
    #[error("Node id already in use: {0}")]
    NodeIdInUse(String),

    #[error("No free port at or above {0}")]
    PortAllocationExhausted(u16),

    #[error("Daemon not found: {0}")]
    DaemonNotFound(String),

    #[error("Failed to spawn {path}: {reason}")]
    SpawnFailed { path: String, reason: String },

    /// Daemon unreachable or answered with a non-success HTTP status
    #[error("RPC transport error: {0}")]
    RpcTransport(String),

    /// Daemon answered with a JSON-RPC error or an unexpected result shape
    #[error("RPC error: {0}")]
    RpcProtocol(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("No nodes available for chain: {0}")]
    NoNodesForChain(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// Settings file or environment problem
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, WardenError>;

impl WardenError {
    /// Check if this error came from talking to a daemon
    pub fn is_rpc(&self) -> bool {
        matches!(self, Self::RpcTransport(_) | Self::RpcProtocol(_))
    }

    /// Check if this error indicates a missing resource
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownChain(_)
                | Self::NodeNotFound(_)
                | Self::NoNodesForChain(_)
                | Self::DaemonNotFound(_)
        )
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(e: serde_json::Error) -> Self {
        WardenError::Storage(e.to_string())
    }
}
