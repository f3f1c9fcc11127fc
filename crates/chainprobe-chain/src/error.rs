//! Probe error taxonomy.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for chain client and adapter operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Everything that can go wrong inside one probe iteration.
///
/// All variants are terminal for the current iteration only. `NotFoundYet`
/// is a retry signal inside the bounded confirmation wait and only
/// surfaces if a client returns it outside of one.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("not found yet: {0}")]
    NotFoundYet(String),

    #[error("confirmation timed out after {}ms", .0.as_millis())]
    TimeoutExceeded(Duration),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl ProbeError {
    /// Short machine-friendly name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Transport(_) => "transport",
            ProbeError::Rpc { .. } => "rpc",
            ProbeError::NotFoundYet(_) => "not_found_yet",
            ProbeError::TimeoutExceeded(_) => "timeout",
            ProbeError::Rejected(_) => "rejected",
            ProbeError::Protocol(_) => "protocol",
        }
    }

    /// Whether the confirmation wait should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProbeError::NotFoundYet(_))
    }
}

/// Errors raised while loading a signing key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid hex key: {0}")]
    Hex(String),

    #[error("invalid base64 key: {0}")]
    Base64(String),

    #[error("invalid base58 key: {0}")]
    Base58(String),

    #[error("invalid bech32 key: {0}")]
    Bech32(String),

    #[error("expected a 32-byte secret key, got {0} bytes")]
    Length(usize),

    #[error("unsupported key scheme flag {0:#04x}, only ed25519 (0x00) is supported")]
    Scheme(u8),

    #[error("unsupported key prefix {0:?}")]
    Prefix(String),

    #[error("keypair public half does not match its secret")]
    KeypairMismatch,

    #[error("invalid secp256k1 secret key")]
    Secp256k1,
}
