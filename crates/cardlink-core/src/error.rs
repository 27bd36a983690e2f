use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Card errors
    #[error("No card present on reader")]
    NoCardPresent,

    #[error("Authentication failed for sector {sector}")]
    AuthenticationFailed { sector: u8 },

    #[error("Block I/O failed on block {block}: {reason}")]
    BlockIoFailed { block: u8, reason: String },

    #[error("Invalid card UID: {0}")]
    InvalidUid(String),

    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    // Relay errors
    #[error("No hardware bridge is connected")]
    BridgeNotConnected,

    #[error("Request {request_id} timed out after {timeout_ms} ms")]
    RequestTimeout { request_id: String, timeout_ms: u64 },

    #[error("Client disconnected: {0}")]
    ClientDisconnected(String),

    #[error("Bridge reported an error: {0}")]
    BridgeFault(String),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Frame too large: {size} bytes exceeds maximum of {max_size}")]
    FrameTooLarge { size: usize, max_size: usize },

    // Collaborator errors
    #[error("Domain validation failed: {0}")]
    DomainValidationFailed(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a [`Error::BlockIoFailed`] from any displayable cause.
    pub fn block_io(block: u8, reason: impl std::fmt::Display) -> Self {
        Self::BlockIoFailed {
            block,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
