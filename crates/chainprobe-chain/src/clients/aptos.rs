//! Aptos fullnode REST client.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::trace;

use crate::account::AccountClient;
use crate::clients::u64_field;
use crate::error::{ProbeError, ProbeResult};
use crate::keys::Ed25519Signer;

const TRANSFER_FUNCTION: &str = "0x1::aptos_account::transfer";

/// Default fullnode REST base for a well-known network name.
pub fn default_url(network: &str) -> Option<&'static str> {
    match network {
        "mainnet" => Some("https://fullnode.mainnet.aptoslabs.com/v1"),
        "testnet" => Some("https://fullnode.testnet.aptoslabs.com/v1"),
        "devnet" => Some("https://fullnode.devnet.aptoslabs.com/v1"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct AptosSettings {
    /// REST base, including the `/v1` prefix.
    pub base_url: String,
    pub receiver: String,
    pub amount: u64,
    pub max_gas_amount: u64,
    pub gas_unit_price: u64,
    /// Lifetime of a built transaction.
    pub expiration: Duration,
    pub request_timeout: Duration,
}

/// Transaction after `encode_submission`: the request body plus the bytes
/// to sign.
#[derive(Debug, Clone)]
pub struct AptosTransaction {
    body: Value,
    signing_message: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct AccountResource {
    sequence_number: Value,
}

#[derive(Debug, Deserialize)]
struct PendingTransaction {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TransactionStatus {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    vm_status: Option<String>,
}

pub struct AptosClient {
    http: reqwest::Client,
    settings: AptosSettings,
    signer: Ed25519Signer,
    sender: String,
}

impl AptosClient {
    pub fn new(settings: AptosSettings, signer: Ed25519Signer) -> ProbeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("chainprobe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        let sender = signer.aptos_address();
        Ok(Self {
            http,
            settings,
            signer,
            sender,
        })
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.settings.base_url.trim_end_matches('/'))
    }

    fn unsigned_body(&self, sequence_number: u64) -> Value {
        let expires_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(self.settings.expiration)
            .as_secs();
        json!({
            "sender": self.sender,
            "sequence_number": sequence_number.to_string(),
            "max_gas_amount": self.settings.max_gas_amount.to_string(),
            "gas_unit_price": self.settings.gas_unit_price.to_string(),
            "expiration_timestamp_secs": expires_at.to_string(),
            "payload": {
                "type": "entry_function_payload",
                "function": TRANSFER_FUNCTION,
                "type_arguments": [],
                "arguments": [self.settings.receiver, self.settings.amount.to_string()],
            },
        })
    }

    async fn read<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> ProbeResult<Option<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::Transport(format!("{what}: {e}")))?;
        let status = response.status();
        trace!(what, %status, "aptos response");
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Rpc {
                code: i64::from(status.as_u16()),
                message: format!("{what}: {body}"),
            });
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| ProbeError::Protocol(format!("{what}: {e}")))
    }
}

impl AccountClient for AptosClient {
    /// Sequence number of the sending account.
    type Preflight = u64;
    type Transaction = AptosTransaction;

    async fn preflight(&self) -> ProbeResult<u64> {
        let url = self.url(&format!("accounts/{}", self.sender));
        let account: AccountResource = self
            .read(self.http.get(url), "get account")
            .await?
            .ok_or_else(|| ProbeError::Rejected(format!("account {} does not exist", self.sender)))?;
        u64_field(&account.sequence_number, "sequence_number")
    }

    async fn build_transfer(&self, sequence_number: u64) -> ProbeResult<AptosTransaction> {
        let body = self.unsigned_body(sequence_number);
        let encoded: String = self
            .read(
                self.http.post(self.url("transactions/encode_submission")).json(&body),
                "encode submission",
            )
            .await?
            .ok_or_else(|| ProbeError::Protocol("encode submission: not found".into()))?;
        let signing_message = decode_hex(&encoded)?;
        Ok(AptosTransaction {
            body,
            signing_message,
        })
    }

    async fn sign_and_submit(&self, transaction: AptosTransaction) -> ProbeResult<String> {
        let AptosTransaction {
            mut body,
            signing_message,
        } = transaction;
        body["signature"] = json!({
            "type": "ed25519_signature",
            "public_key": format!("0x{}", hex::encode(self.signer.public_key_bytes())),
            "signature": format!("0x{}", hex::encode(self.signer.sign(&signing_message))),
        });

        let pending: PendingTransaction = self
            .read(self.http.post(self.url("transactions")).json(&body), "submit")
            .await?
            .ok_or_else(|| ProbeError::Protocol("submit: not found".into()))?;
        Ok(pending.hash)
    }

    async fn is_committed(&self, tx_hash: &str) -> ProbeResult<bool> {
        let url = self.url(&format!("transactions/by_hash/{tx_hash}"));
        let Some(status) = self
            .read::<TransactionStatus>(self.http.get(url), "get transaction")
            .await?
        else {
            return Err(ProbeError::NotFoundYet(tx_hash.to_string()));
        };
        committed(tx_hash, &status)
    }
}

fn committed(tx_hash: &str, status: &TransactionStatus) -> ProbeResult<bool> {
    if status.kind == "pending_transaction" {
        return Ok(false);
    }
    match status.success {
        Some(true) => Ok(true),
        Some(false) => Err(ProbeError::Rejected(format!(
            "{tx_hash}: {}",
            status.vm_status.as_deref().unwrap_or("unknown vm status")
        ))),
        None => Err(ProbeError::Protocol(format!(
            "{tx_hash}: `{}` without a success flag",
            status.kind
        ))),
    }
}

fn decode_hex(value: &str) -> ProbeResult<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ProbeError::Protocol(format!("signing message is not hex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AptosClient {
        let signer = Ed25519Signer::from_bytes(&[3u8; 32]).unwrap();
        AptosClient::new(
            AptosSettings {
                base_url: "http://127.0.0.1:8080/v1/".into(),
                receiver: "0xb0b".into(),
                amount: 1,
                max_gas_amount: 1000,
                gas_unit_price: 100,
                expiration: Duration::from_secs(30),
                request_timeout: Duration::from_secs(5),
            },
            signer,
        )
        .unwrap()
    }

    #[test]
    fn body_carries_sequence_and_gas_as_strings() {
        let client = client();
        let body = client.unsigned_body(41);
        assert_eq!(body["sender"], client.sender());
        assert_eq!(body["sequence_number"], "41");
        assert_eq!(body["max_gas_amount"], "1000");
        assert_eq!(body["gas_unit_price"], "100");
        assert_eq!(body["payload"]["function"], TRANSFER_FUNCTION);
        assert_eq!(body["payload"]["arguments"], json!(["0xb0b", "1"]));
    }

    #[test]
    fn url_joins_without_double_slash() {
        assert_eq!(
            client().url("transactions"),
            "http://127.0.0.1:8080/v1/transactions"
        );
    }

    #[test]
    fn commit_status_mapping() {
        let pending = TransactionStatus {
            kind: "pending_transaction".into(),
            success: None,
            vm_status: None,
        };
        assert!(!committed("0x1", &pending).unwrap());

        let ok = TransactionStatus {
            kind: "user_transaction".into(),
            success: Some(true),
            vm_status: Some("Executed successfully".into()),
        };
        assert!(committed("0x1", &ok).unwrap());

        let failed = TransactionStatus {
            kind: "user_transaction".into(),
            success: Some(false),
            vm_status: Some("Move abort: EINSUFFICIENT_BALANCE".into()),
        };
        let err = committed("0x1", &failed).unwrap_err();
        assert_eq!(err.kind(), "rejected");
        assert!(err.to_string().contains("EINSUFFICIENT_BALANCE"));
    }

    #[test]
    fn well_known_networks_have_defaults() {
        assert!(default_url("mainnet").is_some());
        assert!(default_url("testnet").is_some());
        assert!(default_url("localnet").is_none());
    }
}
