//! EVM JSON-RPC client.
//!
//! Transfers are legacy transactions with EIP-155 replay protection,
//! signed in process and broadcast with `eth_sendRawTransaction`. The
//! chain id is asked from the node once and cached.

use std::time::Duration;

use rlp::RlpStream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;

use crate::error::{KeyError, ProbeError, ProbeResult};
use crate::keys::{Secp256k1Signer, keccak256};
use crate::ledger::{LedgerClient, LedgerTransfer, Receipt};
use crate::rpc::JsonRpcClient;

#[derive(Debug, Clone)]
pub struct EvmSettings {
    pub url: String,
    pub receiver: String,
    /// Transfer value in wei.
    pub amount: u128,
    /// Explicit gas limit; `None` asks `eth_estimateGas` per transfer.
    pub gas_limit: Option<u64>,
    pub request_timeout: Duration,
}

/// Legacy (type 0) value transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub value: u128,
    pub chain_id: u64,
}

impl LegacyTransaction {
    /// Keccak-256 of the EIP-155 signing payload.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream
            .append(&self.chain_id)
            .append_empty_data()
            .append_empty_data();
        keccak256(&stream.out())
    }

    /// Sign and encode for `eth_sendRawTransaction`.
    pub fn sign(&self, signer: &Secp256k1Signer) -> Result<Vec<u8>, KeyError> {
        let (rs, recovery) = signer.sign_digest(&self.signing_hash())?;
        let v = self
            .chain_id
            .saturating_mul(2)
            .saturating_add(35 + u64::from(recovery));

        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream
            .append(&v)
            .append(&trim_leading_zeros(&rs[..32]))
            .append(&trim_leading_zeros(&rs[32..]));
        Ok(stream.out().to_vec())
    }

    fn append_fields(&self, stream: &mut RlpStream) {
        stream
            .append(&self.nonce)
            .append(&self.gas_price)
            .append(&self.gas_limit)
            .append(&self.to.to_vec())
            .append(&self.value)
            .append_empty_data();
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    block_number: Option<String>,
    status: Option<String>,
}

#[derive(Debug)]
pub struct EvmClient {
    rpc: JsonRpcClient,
    settings: EvmSettings,
    signer: Secp256k1Signer,
    sender: String,
    receiver: [u8; 20],
    chain_id: OnceCell<u64>,
}

impl EvmClient {
    pub fn new(settings: EvmSettings, signer: Secp256k1Signer) -> ProbeResult<Self> {
        let rpc = JsonRpcClient::new(settings.url.clone(), settings.request_timeout)?;
        let receiver = parse_address(&settings.receiver)?;
        Ok(Self {
            rpc,
            sender: signer.address(),
            receiver,
            settings,
            signer,
            chain_id: OnceCell::new(),
        })
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    async fn chain_id(&self) -> ProbeResult<u64> {
        let id = self
            .chain_id
            .get_or_try_init(|| async {
                let id: String = self.rpc.call("eth_chainId", json!([])).await?;
                parse_u64_quantity(&id, "chain id")
            })
            .await?;
        Ok(*id)
    }

    async fn gas_limit(&self) -> ProbeResult<u64> {
        if let Some(gas) = self.settings.gas_limit {
            return Ok(gas);
        }
        let estimate: String = self
            .rpc
            .call(
                "eth_estimateGas",
                json!([{
                    "from": self.sender,
                    "to": self.settings.receiver,
                    "value": to_quantity(self.settings.amount),
                }]),
            )
            .await?;
        parse_u64_quantity(&estimate, "gas estimate")
    }
}

impl LedgerClient for EvmClient {
    async fn nonce(&self) -> ProbeResult<u64> {
        let count: String = self
            .rpc
            .call("eth_getTransactionCount", json!([self.sender, "latest"]))
            .await?;
        parse_u64_quantity(&count, "nonce")
    }

    async fn gas_price(&self) -> ProbeResult<u128> {
        let price: String = self.rpc.call("eth_gasPrice", json!([])).await?;
        parse_quantity(&price)
    }

    async fn sign_and_send(&self, transfer: LedgerTransfer) -> ProbeResult<String> {
        let transaction = LegacyTransaction {
            nonce: transfer.nonce,
            gas_price: transfer.gas_price,
            gas_limit: self.gas_limit().await?,
            to: self.receiver,
            value: self.settings.amount,
            chain_id: self.chain_id().await?,
        };
        let raw = transaction
            .sign(&self.signer)
            .map_err(|e| ProbeError::Protocol(format!("signing failed: {e}")))?;
        self.rpc
            .call(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await
    }

    async fn receipt(&self, tx_hash: &str) -> ProbeResult<Option<Receipt>> {
        let raw: Option<RawReceipt> = self
            .rpc
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        raw.map(|raw| {
            Ok(Receipt {
                block_number: raw
                    .block_number
                    .as_deref()
                    .map(|n| parse_u64_quantity(n, "block number"))
                    .transpose()?,
                // Pre-Byzantium receipts carry no status field.
                succeeded: raw.status.as_deref() != Some("0x0"),
            })
        })
        .transpose()
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> ProbeResult<u128> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ProbeError::Protocol(format!("quantity without 0x prefix: {value}")))?;
    if digits.is_empty() {
        return Err(ProbeError::Protocol("empty quantity".into()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ProbeError::Protocol(format!("invalid quantity {value}: {e}")))
}

fn parse_u64_quantity(value: &str, what: &str) -> ProbeResult<u64> {
    let parsed = parse_quantity(value)?;
    u64::try_from(parsed).map_err(|_| ProbeError::Protocol(format!("{what} {parsed} overflows u64")))
}

/// Encode a quantity as minimal `0x`-prefixed hex.
pub fn to_quantity(value: u128) -> String {
    format!("{value:#x}")
}

/// Parse a 20-byte `0x` address; checksum casing is not verified.
pub fn parse_address(value: &str) -> ProbeResult<[u8; 20]> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits)
        .ok()
        .and_then(|bytes| <[u8; 20]>::try_from(bytes).ok())
        .ok_or_else(|| ProbeError::Protocol(format!("invalid address {value}")))
}
