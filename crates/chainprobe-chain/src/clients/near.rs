//! NEAR JSON-RPC client.
//!
//! Transfers are borsh-encoded transactions signed with the sender's
//! full-access ed25519 key. The access key nonce and a recent block hash
//! are read before the measured window.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use borsh::BorshSerialize;
use borsh::io::{Result as IoResult, Write};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::account::AccountClient;
use crate::error::{ProbeError, ProbeResult};
use crate::keys::Ed25519Signer;
use crate::rpc::JsonRpcClient;

/// Borsh variant index of `Action::Transfer`.
const TRANSFER_ACTION: u8 = 3;

pub fn default_url(network: &str) -> Option<&'static str> {
    match network {
        "mainnet" => Some("https://rpc.mainnet.near.org"),
        "testnet" => Some("https://rpc.testnet.near.org"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct NearSettings {
    pub url: String,
    pub signer_id: String,
    pub receiver_id: String,
    /// Deposit in yoctoNEAR.
    pub amount: u128,
    pub request_timeout: Duration,
}

/// Access key state read before building.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AccessKey {
    pub nonce: u64,
    pub block_hash: [u8; 32],
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKey")
            .field("nonce", &self.nonce)
            .field("block_hash", &bs58::encode(self.block_hash).into_string())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
enum PublicKey {
    Ed25519([u8; 32]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Transfer { deposit: u128 },
}

impl BorshSerialize for Action {
    fn serialize<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        match self {
            Action::Transfer { deposit } => {
                TRANSFER_ACTION.serialize(writer)?;
                deposit.serialize(writer)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
struct Transaction {
    signer_id: String,
    public_key: PublicKey,
    nonce: u64,
    receiver_id: String,
    block_hash: [u8; 32],
    actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
enum Signature {
    Ed25519([u8; 64]),
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
struct SignedTransaction {
    transaction: Transaction,
    signature: Signature,
}

/// Borsh-encoded unsigned transaction and its sha256 hash.
#[derive(Debug, Clone)]
pub struct NearTransaction {
    transaction: Transaction,
    hash: [u8; 32],
}

impl NearTransaction {
    /// Base58 transaction hash, as nodes report it.
    pub fn hash(&self) -> String {
        bs58::encode(self.hash).into_string()
    }
}

#[derive(Debug, Deserialize)]
struct AccessKeyView {
    nonce: u64,
    block_hash: String,
}

pub struct NearClient {
    rpc: JsonRpcClient,
    settings: NearSettings,
    signer: Ed25519Signer,
    public_key: String,
}

impl NearClient {
    pub fn new(settings: NearSettings, signer: Ed25519Signer) -> ProbeResult<Self> {
        let rpc = JsonRpcClient::new(settings.url.clone(), settings.request_timeout)?;
        Ok(Self {
            rpc,
            public_key: format!("ed25519:{}", signer.base58_public_key()),
            settings,
            signer,
        })
    }

    pub fn signer_id(&self) -> &str {
        &self.settings.signer_id
    }

    fn transaction(&self, access: AccessKey) -> ProbeResult<NearTransaction> {
        let transaction = Transaction {
            signer_id: self.settings.signer_id.clone(),
            public_key: PublicKey::Ed25519(self.signer.public_key_bytes()),
            nonce: access.nonce + 1,
            receiver_id: self.settings.receiver_id.clone(),
            block_hash: access.block_hash,
            actions: vec![Action::Transfer {
                deposit: self.settings.amount,
            }],
        };
        let bytes = borsh::to_vec(&transaction)
            .map_err(|e| ProbeError::Protocol(format!("borsh encoding failed: {e}")))?;
        Ok(NearTransaction {
            transaction,
            hash: Sha256::digest(&bytes).into(),
        })
    }
}

impl AccountClient for NearClient {
    type Preflight = AccessKey;
    type Transaction = NearTransaction;

    async fn preflight(&self) -> ProbeResult<AccessKey> {
        let view: Value = self
            .rpc
            .call(
                "query",
                json!({
                    "request_type": "view_access_key",
                    "finality": "final",
                    "account_id": self.settings.signer_id,
                    "public_key": self.public_key,
                }),
            )
            .await?;
        parse_access_key(&view)
    }

    async fn build_transfer(&self, access: AccessKey) -> ProbeResult<NearTransaction> {
        self.transaction(access)
    }

    async fn sign_and_submit(&self, transaction: NearTransaction) -> ProbeResult<String> {
        let signed = SignedTransaction {
            signature: Signature::Ed25519(self.signer.sign(&transaction.hash)),
            transaction: transaction.transaction,
        };
        let bytes = borsh::to_vec(&signed)
            .map_err(|e| ProbeError::Protocol(format!("borsh encoding failed: {e}")))?;
        self.rpc
            .call("broadcast_tx_async", json!([BASE64.encode(bytes)]))
            .await
    }

    async fn is_committed(&self, tx_hash: &str) -> ProbeResult<bool> {
        let outcome: Value = match self
            .rpc
            .call(
                "tx",
                json!({
                    "tx_hash": tx_hash,
                    "sender_account_id": self.settings.signer_id,
                    "wait_until": "EXECUTED_OPTIMISTIC",
                }),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(ProbeError::Rpc { message, .. }) if is_pending(&message) => {
                return Err(ProbeError::NotFoundYet(tx_hash.to_string()));
            }
            Err(e) => return Err(e),
        };
        transaction_committed(tx_hash, &outcome)
    }
}

fn parse_access_key(view: &Value) -> ProbeResult<AccessKey> {
    // Older nodes report query errors inside a successful result.
    if let Some(error) = view.get("error").and_then(Value::as_str) {
        return Err(ProbeError::Rejected(format!("access key lookup failed: {error}")));
    }
    let view: AccessKeyView = serde_json::from_value(view.clone())
        .map_err(|e| ProbeError::Protocol(format!("view_access_key: {e}")))?;
    let block_hash = bs58::decode(&view.block_hash)
        .into_vec()
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(|| ProbeError::Protocol(format!("invalid block hash {}", view.block_hash)))?;
    Ok(AccessKey {
        nonce: view.nonce,
        block_hash,
    })
}

fn is_pending(message: &str) -> bool {
    message.contains("UNKNOWN_TRANSACTION") || message.contains("TIMEOUT_ERROR")
}

fn transaction_committed(tx_hash: &str, outcome: &Value) -> ProbeResult<bool> {
    let Some(status) = outcome.get("status") else {
        return Ok(false);
    };
    if let Some(failure) = status.get("Failure") {
        return Err(ProbeError::Rejected(format!("{tx_hash}: {failure}")));
    }
    Ok(status.get("SuccessValue").is_some() || status.get("SuccessReceiptId").is_some())
}
