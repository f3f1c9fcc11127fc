//! Sui JSON-RPC client.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::account::AccountClient;
use crate::clients::u64_field;
use crate::error::{ProbeError, ProbeResult};
use crate::keys::{ED25519_FLAG, Ed25519Signer, blake2b256};
use crate::object::{Execution, GasHandle, ObjectClient, SharedObjectRef};
use crate::rpc::JsonRpcClient;

/// Intent prefix for a transaction-data signature: scope, version, app id.
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

const MODULE: &str = "counter";
const FUNCTION: &str = "increment";

/// Default fullnode JSON-RPC URL for a well-known network name.
pub fn default_url(network: &str) -> Option<&'static str> {
    match network {
        "mainnet" => Some("https://fullnode.mainnet.sui.io:443"),
        "testnet" => Some("https://fullnode.testnet.sui.io:443"),
        "devnet" => Some("https://fullnode.devnet.sui.io:443"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct SuiSettings {
    pub url: String,
    /// Package holding `counter::increment`.
    pub package: String,
    pub shared_object: String,
    pub gas_budget: u64,
    pub request_timeout: Duration,
}

/// Unsigned transaction bytes, base64 as returned by the node.
#[derive(Debug, Clone)]
pub struct SuiTransaction {
    tx_bytes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionBlockBytes {
    tx_bytes: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    digest: String,
    #[serde(default)]
    effects: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TransactionBlock {
    #[serde(default)]
    checkpoint: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinPage {
    data: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Coin {
    coin_object_id: String,
}

/// Endpoint and sender key shared by both Sui clients.
struct Session {
    rpc: JsonRpcClient,
    signer: Ed25519Signer,
    sender: String,
}

impl Session {
    fn new(url: &str, request_timeout: Duration, signer: Ed25519Signer) -> ProbeResult<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(url, request_timeout)?,
            sender: signer.sui_address(),
            signer,
        })
    }

    /// Serialized signature over the intent message of `tx_bytes`:
    /// base64 of `flag || signature || public key`.
    fn sign_transaction(&self, tx_bytes: &[u8]) -> String {
        let digest = blake2b256(&[TRANSACTION_INTENT.as_slice(), tx_bytes]);
        let mut serialized = Vec::with_capacity(1 + 64 + 32);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&self.signer.sign(&digest));
        serialized.extend_from_slice(&self.signer.public_key_bytes());
        BASE64.encode(serialized)
    }

    async fn build(&self, method: &str, params: Value) -> ProbeResult<SuiTransaction> {
        let built: TransactionBlockBytes = self.rpc.call(method, params).await?;
        Ok(SuiTransaction {
            tx_bytes: built.tx_bytes,
        })
    }

    async fn execute(&self, transaction: SuiTransaction) -> ProbeResult<Execution> {
        let bytes = BASE64
            .decode(&transaction.tx_bytes)
            .map_err(|e| ProbeError::Protocol(format!("txBytes is not base64: {e}")))?;
        let signature = self.sign_transaction(&bytes);

        let response: ExecuteResponse = self
            .rpc
            .call(
                "sui_executeTransactionBlock",
                json!([
                    transaction.tx_bytes,
                    [signature],
                    {"showEffects": true},
                    "WaitForLocalExecution",
                ]),
            )
            .await?;
        execution_from(response)
    }

    async fn checkpoint(&self, digest: &str) -> ProbeResult<Option<u64>> {
        let block: TransactionBlock = match self
            .rpc
            .call::<TransactionBlock>("sui_getTransactionBlock", json!([digest, {}]))
            .await
        {
            Ok(block) => block,
            Err(ProbeError::Rpc { message, .. }) if is_not_indexed(&message) => {
                return Err(ProbeError::NotFoundYet(digest.to_string()));
            }
            Err(e) => return Err(e),
        };
        block
            .checkpoint
            .filter(|c| !c.is_null())
            .map(|c| u64_field(&c, "checkpoint"))
            .transpose()
    }
}

/// Shared counter client (`counter::increment`).
pub struct SuiClient {
    session: Session,
    settings: SuiSettings,
}

impl SuiClient {
    pub fn new(settings: SuiSettings, signer: Ed25519Signer) -> ProbeResult<Self> {
        let session = Session::new(&settings.url, settings.request_timeout, signer)?;
        Ok(Self { session, settings })
    }

    pub fn sender(&self) -> &str {
        &self.session.sender
    }
}

impl ObjectClient for SuiClient {
    type Transaction = SuiTransaction;

    async fn resolve_shared_object(&self) -> ProbeResult<SharedObjectRef> {
        let response: Value = self
            .session
            .rpc
            .call(
                "sui_getObject",
                json!([self.settings.shared_object, {"showOwner": true}]),
            )
            .await?;
        parse_shared_object(&response)
    }

    async fn build_call(
        &self,
        object: &SharedObjectRef,
        gas: Option<&GasHandle>,
    ) -> ProbeResult<SuiTransaction> {
        self.session
            .build(
                "unsafe_moveCall",
                json!([
                    self.session.sender,
                    self.settings.package,
                    MODULE,
                    FUNCTION,
                    [],
                    [object.object_id],
                    gas.map(|g| g.object_id.as_str()),
                    self.settings.gas_budget.to_string(),
                ]),
            )
            .await
    }

    async fn sign_and_execute(&self, transaction: SuiTransaction) -> ProbeResult<Execution> {
        self.session.execute(transaction).await
    }

    async fn checkpoint(&self, digest: &str) -> ProbeResult<Option<u64>> {
        self.session.checkpoint(digest).await
    }
}

#[derive(Debug, Clone)]
pub struct SuiTransferSettings {
    pub url: String,
    pub receiver: String,
    /// Amount in MIST.
    pub amount: u64,
    pub gas_budget: u64,
    /// Count the transfer as committed only once it is in a checkpoint.
    pub wait_for_finality: bool,
    pub request_timeout: Duration,
}

/// Peer-to-peer SUI transfer client. The paying coin also covers gas.
pub struct SuiTransferClient {
    session: Session,
    settings: SuiTransferSettings,
}

impl SuiTransferClient {
    pub fn new(settings: SuiTransferSettings, signer: Ed25519Signer) -> ProbeResult<Self> {
        let session = Session::new(&settings.url, settings.request_timeout, signer)?;
        Ok(Self { session, settings })
    }

    pub fn sender(&self) -> &str {
        &self.session.sender
    }
}

impl AccountClient for SuiTransferClient {
    /// Object id of the coin to split the transfer from.
    type Preflight = String;
    type Transaction = SuiTransaction;

    async fn preflight(&self) -> ProbeResult<String> {
        let page: CoinPage = self
            .session
            .rpc
            .call(
                "suix_getCoins",
                json!([self.session.sender, SUI_COIN_TYPE, null, 1]),
            )
            .await?;
        page.data
            .into_iter()
            .next()
            .map(|coin| coin.coin_object_id)
            .ok_or_else(|| ProbeError::Rejected(format!("{} owns no SUI coins", self.session.sender)))
    }

    async fn build_transfer(&self, coin: String) -> ProbeResult<SuiTransaction> {
        self.session
            .build(
                "unsafe_transferSui",
                json!([
                    self.session.sender,
                    coin,
                    self.settings.gas_budget.to_string(),
                    self.settings.receiver,
                    self.settings.amount.to_string(),
                ]),
            )
            .await
    }

    async fn sign_and_submit(&self, transaction: SuiTransaction) -> ProbeResult<String> {
        Ok(self.session.execute(transaction).await?.digest)
    }

    /// Executed transactions are readable from the fullnode right away;
    /// with `wait_for_finality` a checkpoint is required as well.
    async fn is_committed(&self, digest: &str) -> ProbeResult<bool> {
        let checkpoint = self.session.checkpoint(digest).await?;
        Ok(checkpoint.is_some() || !self.settings.wait_for_finality)
    }
}

fn parse_shared_object(response: &Value) -> ProbeResult<SharedObjectRef> {
    if let Some(error) = response.get("error") {
        return Err(ProbeError::Rejected(format!("shared object lookup failed: {error}")));
    }
    let data = response
        .get("data")
        .ok_or_else(|| ProbeError::Protocol("sui_getObject without `data`".into()))?;
    let object_id = data
        .get("objectId")
        .and_then(Value::as_str)
        .ok_or_else(|| ProbeError::Protocol("object without `objectId`".into()))?
        .to_string();
    let initial_shared_version = data
        .pointer("/owner/Shared/initial_shared_version")
        .ok_or_else(|| ProbeError::Rejected(format!("object {object_id} is not shared")))?;
    Ok(SharedObjectRef {
        initial_shared_version: u64_field(initial_shared_version, "initial_shared_version")?,
        version: u64_field(data.get("version").unwrap_or(&Value::Null), "version")?,
        object_id,
    })
}

fn execution_from(response: ExecuteResponse) -> ProbeResult<Execution> {
    let effects = response.effects.unwrap_or(Value::Null);
    match effects.pointer("/status/status").and_then(Value::as_str) {
        Some("success") | None => {}
        Some(_) => {
            let reason = effects
                .pointer("/status/error")
                .and_then(Value::as_str)
                .unwrap_or("execution failed");
            return Err(ProbeError::Rejected(format!("{}: {reason}", response.digest)));
        }
    }
    let gas = effects
        .pointer("/gasObject/reference/objectId")
        .and_then(Value::as_str)
        .map(|id| GasHandle {
            object_id: id.to_string(),
        });
    Ok(Execution {
        digest: response.digest,
        gas,
    })
}

fn is_not_indexed(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("could not find") || message.contains("not found")
}
