//! chainprobe-chain — chain adapters for the latency probe.
//!
//! Every adapter performs one probe iteration: build, sign, submit and
//! confirm a minimal state-changing transaction, recording a timestamp at
//! each phase boundary. Adapters never return an error to the caller;
//! everything is folded into a [`ProbeOutcome`].
//!
//! # Architecture
//!
//! ```text
//! ChainAdapter::run_once() → ProbeOutcome
//!   ├── AccountTransferAdapter<C: AccountClient>  (preflight read, build, commit poll)
//!   ├── LedgerTransferAdapter<C: LedgerClient>    (nonce + fee, receipt polling)
//!   └── ObjectMutationAdapter<C: ObjectClient>    (shared object call)
//!
//! clients (concrete chain endpoints)
//!   ├── AptosClient        → AccountClient  (REST)
//!   ├── SolanaClient       → AccountClient  (JSON-RPC)
//!   ├── NearClient         → AccountClient  (JSON-RPC)
//!   ├── SuiTransferClient  → AccountClient  (JSON-RPC)
//!   ├── EvmClient          → LedgerClient   (JSON-RPC)
//!   └── SuiClient          → ObjectClient   (JSON-RPC)
//! ```
//!
//! The bounded confirmation wait lives in [`poll`]: it retries on
//! "not found yet", stops on any other error and converts an expired
//! deadline into [`ProbeError::TimeoutExceeded`].

pub mod account;
pub mod adapter;
pub mod clients;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod object;
pub mod outcome;
pub mod poll;
pub mod rpc;

pub use account::{AccountClient, AccountTransferAdapter};
pub use adapter::{AdapterKind, ChainAdapter};
pub use clients::{
    AptosClient, AptosSettings, Commitment, EvmClient, EvmSettings, LegacyTransaction, NearClient,
    NearSettings, SolanaClient, SolanaSettings, SuiClient, SuiSettings, SuiTransferClient,
    SuiTransferSettings,
};
pub use error::{KeyError, ProbeError, ProbeResult};
pub use keys::{Ed25519Signer, Secp256k1Signer};
pub use ledger::{LedgerClient, LedgerTransfer, LedgerTransferAdapter, Receipt, uplift_fee};
pub use object::{Execution, GasHandle, ObjectClient, ObjectMutationAdapter, SharedObjectRef};
pub use outcome::{PhaseTimeline, PhaseTimestamp, ProbeOutcome, phase};
pub use poll::{PollPolicy, poll_until};
pub use rpc::JsonRpcClient;
