//! Solana JSON-RPC client.
//!
//! A transfer is one system-program instruction in a legacy message,
//! signed by the sender alone. The recent blockhash is read before the
//! measured window; building is local.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::account::AccountClient;
use crate::error::{ProbeError, ProbeResult};
use crate::keys::Ed25519Signer;
use crate::rpc::JsonRpcClient;

pub const SYSTEM_PROGRAM: [u8; 32] = [0; 32];

/// System program instruction index of `Transfer`.
const TRANSFER_INSTRUCTION: u32 = 2;

/// Default JSON-RPC URL for a cluster name.
pub fn default_url(cluster: &str) -> Option<&'static str> {
    match cluster {
        "mainnet-beta" | "mainnet" => Some("https://api.mainnet-beta.solana.com"),
        "testnet" => Some("https://api.testnet.solana.com"),
        "devnet" => Some("https://api.devnet.solana.com"),
        _ => None,
    }
}

/// How settled a transaction must be to count as committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!(
                "unknown commitment level {other:?}, expected processed, confirmed or finalized"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolanaSettings {
    pub url: String,
    /// Base58 receiver account.
    pub receiver: String,
    pub lamports: u64,
    pub commitment: Commitment,
    pub request_timeout: Duration,
}

/// A recent blockhash.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Blockhash(pub [u8; 32]);

impl fmt::Debug for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blockhash({})", bs58::encode(self.0).into_string())
    }
}

/// Serialized message, ready to sign.
#[derive(Debug, Clone)]
pub struct SolanaTransaction {
    message: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct LatestBlockhash {
    value: BlockhashValue,
}

#[derive(Debug, Deserialize)]
struct BlockhashValue {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
struct SignatureStatuses {
    value: Vec<Value>,
}

pub struct SolanaClient {
    rpc: JsonRpcClient,
    settings: SolanaSettings,
    signer: Ed25519Signer,
    sender: [u8; 32],
    receiver: [u8; 32],
}

impl SolanaClient {
    pub fn new(settings: SolanaSettings, signer: Ed25519Signer) -> ProbeResult<Self> {
        let rpc = JsonRpcClient::new(settings.url.clone(), settings.request_timeout)?;
        let receiver = decode_key(&settings.receiver)?;
        Ok(Self {
            rpc,
            sender: signer.public_key_bytes(),
            receiver,
            settings,
            signer,
        })
    }

    pub fn sender(&self) -> String {
        bs58::encode(self.sender).into_string()
    }
}

impl AccountClient for SolanaClient {
    type Preflight = Blockhash;
    type Transaction = SolanaTransaction;

    async fn preflight(&self) -> ProbeResult<Blockhash> {
        let latest: LatestBlockhash = self
            .rpc
            .call(
                "getLatestBlockhash",
                json!([{"commitment": self.settings.commitment.as_str()}]),
            )
            .await?;
        decode_key(&latest.value.blockhash).map(Blockhash)
    }

    async fn build_transfer(&self, blockhash: Blockhash) -> ProbeResult<SolanaTransaction> {
        Ok(SolanaTransaction {
            message: transfer_message(
                &self.sender,
                &self.receiver,
                self.settings.lamports,
                &blockhash.0,
            ),
        })
    }

    async fn sign_and_submit(&self, transaction: SolanaTransaction) -> ProbeResult<String> {
        let signature = self.signer.sign(&transaction.message);
        let mut wire = Vec::with_capacity(1 + signature.len() + transaction.message.len());
        encode_length(&mut wire, 1);
        wire.extend_from_slice(&signature);
        wire.extend_from_slice(&transaction.message);

        self.rpc
            .call(
                "sendTransaction",
                json!([
                    BASE64.encode(wire),
                    {
                        "encoding": "base64",
                        "skipPreflight": true,
                        "preflightCommitment": self.settings.commitment.as_str(),
                    },
                ]),
            )
            .await
    }

    async fn is_committed(&self, signature: &str) -> ProbeResult<bool> {
        let statuses: SignatureStatuses = self
            .rpc
            .call("getSignatureStatuses", json!([[signature]]))
            .await?;
        let status = statuses.value.into_iter().next().unwrap_or(Value::Null);
        signature_committed(signature, &status, self.settings.commitment)
    }
}

/// Legacy message with a single system transfer from `from` to `to`.
pub fn transfer_message(from: &[u8; 32], to: &[u8; 32], lamports: u64, blockhash: &[u8; 32]) -> Vec<u8> {
    let mut keys = vec![from];
    if to != from {
        keys.push(to);
    }
    keys.push(&SYSTEM_PROGRAM);
    let to_index = if to == from { 0 } else { 1 };
    let program_index = (keys.len() - 1) as u8;

    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&TRANSFER_INSTRUCTION.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    // One writable signer, no readonly signers, the program is readonly.
    let mut message = vec![1, 0, 1];
    encode_length(&mut message, keys.len());
    for key in keys {
        message.extend_from_slice(key);
    }
    message.extend_from_slice(blockhash);

    encode_length(&mut message, 1);
    message.push(program_index);
    encode_length(&mut message, 2);
    message.extend_from_slice(&[0, to_index]);
    encode_length(&mut message, data.len());
    message.extend_from_slice(&data);
    message
}

/// Compact-u16 length prefix.
fn encode_length(out: &mut Vec<u8>, len: usize) {
    let mut rest = len;
    loop {
        let byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn decode_key(value: &str) -> ProbeResult<[u8; 32]> {
    bs58::decode(value)
        .into_vec()
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(|| ProbeError::Protocol(format!("not a base58 32-byte key: {value}")))
}

fn signature_committed(signature: &str, status: &Value, required: Commitment) -> ProbeResult<bool> {
    if status.is_null() {
        return Err(ProbeError::NotFoundYet(signature.to_string()));
    }
    if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
        return Err(ProbeError::Rejected(format!("{signature}: {err}")));
    }
    let reached = match status.get("confirmationStatus").and_then(Value::as_str) {
        Some(level) => level
            .parse::<Commitment>()
            .map_err(|e| ProbeError::Protocol(format!("{signature}: {e}")))?,
        // Nodes omit the field for rooted transactions.
        None => Commitment::Finalized,
    };
    Ok(reached >= required)
}
