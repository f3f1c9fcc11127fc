//! The chain adapter seam.

use std::fmt;
use std::future::Future;

use crate::outcome::ProbeOutcome;

/// Adapter variant, one per chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    /// Account transfers after a preflight read (Aptos, Solana, NEAR, Sui
    /// coin transfers).
    AccountTransfer,
    /// Nonce + fee accounts with receipt polling (e.g. EVM chains).
    LedgerTransfer,
    /// Shared/owned object chains (e.g. Sui).
    ObjectMutation,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdapterKind::AccountTransfer => "account-transfer",
            AdapterKind::LedgerTransfer => "ledger-transfer",
            AdapterKind::ObjectMutation => "object-mutation",
        })
    }
}

/// Builds, submits and confirms one probe transaction per call.
///
/// Implementations catch every error and report it as
/// [`ProbeOutcome::Failure`]; nothing propagates past `run_once`. State
/// kept between calls must never make the next call fail because the
/// previous one did.
pub trait ChainAdapter: Send {
    fn kind(&self) -> AdapterKind;

    fn run_once(&mut self) -> impl Future<Output = ProbeOutcome> + Send;
}
