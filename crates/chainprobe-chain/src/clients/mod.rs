//! Concrete chain endpoints behind the adapter client traits.

pub mod aptos;
pub mod evm;
pub mod near;
pub mod solana;
pub mod sui;

pub use aptos::{AptosClient, AptosSettings};
pub use evm::{EvmClient, EvmSettings, LegacyTransaction};
pub use near::{NearClient, NearSettings};
pub use solana::{Commitment, SolanaClient, SolanaSettings};
pub use sui::{SuiClient, SuiSettings, SuiTransferClient, SuiTransferSettings};

use serde_json::Value;

use crate::error::{ProbeError, ProbeResult};

/// Read an unsigned integer that nodes encode either as a JSON number or
/// as a decimal string (u64 values above 2^53 are usually strings).
pub(crate) fn u64_field(value: &Value, field: &str) -> ProbeResult<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ProbeError::Protocol(format!("`{field}` is not an unsigned integer: {value}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn u64_field_accepts_numbers_and_strings() {
        assert_eq!(u64_field(&json!(42), "v").unwrap(), 42);
        assert_eq!(u64_field(&json!("18446744073709551615"), "v").unwrap(), u64::MAX);
        assert_eq!(u64_field(&json!(null), "v").unwrap_err().kind(), "protocol");
        assert_eq!(u64_field(&json!("-1"), "v").unwrap_err().kind(), "protocol");
    }
}
