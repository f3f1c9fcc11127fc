//! Startup configuration: command line flags backed by environment
//! variables, validated once into an immutable [`ProbeConfig`].

use std::time::Duration;

use chainprobe_chain::clients::{aptos, near, solana, sui};
use chainprobe_chain::{
    AptosSettings, Commitment, Ed25519Signer, EvmSettings, KeyError, NearSettings, PollPolicy,
    Secp256k1Signer, SolanaSettings, SuiSettings, SuiTransferSettings,
};
use chainprobe_metrics::{EndpointConfig, Labels, MetricName, SampleError};
use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required for the {1} family")]
    Missing(&'static str, ChainFamily),

    #[error("PING_INTERVAL must be a positive number of seconds, got {0}")]
    PingInterval(f64),

    #[error("no default RPC URL for chain {0:?}, set URL")]
    NoDefaultUrl(String),

    #[error("ACC1_ADDR {configured} does not match {derived} derived from ACC1_PRIVATE_KEY")]
    SenderMismatch { configured: String, derived: String },

    #[error("invalid metric name or label: {0}")]
    Metric(#[from] SampleError),

    #[error("invalid {var}: {source}")]
    Key {
        var: &'static str,
        #[source]
        source: KeyError,
    },
}

/// Chain family, which also selects the adapter variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChainFamily {
    /// Sequence-numbered account transfer over the Aptos REST API.
    Aptos,
    /// Nonce-based transfer over EVM JSON-RPC.
    Evm,
    /// Shared counter increment over Sui JSON-RPC.
    Sui,
    /// SUI coin transfer between two addresses.
    SuiTransfer,
    /// System-program transfer over Solana JSON-RPC.
    Solana,
    /// Named-account transfer over NEAR JSON-RPC.
    Near,
}

impl ChainFamily {
    pub fn default_metric_name(self) -> &'static str {
        match self {
            ChainFamily::Aptos => "e2e_p2p_txn_latency",
            ChainFamily::Evm => "e2e_p2p_txn_latency_evm",
            ChainFamily::Sui => "e2e_shared_obj_incr_txn_latency_sui",
            ChainFamily::SuiTransfer => "e2e_p2p_txn_latency_sui",
            ChainFamily::Solana => "e2e_p2p_txn_latency_solana",
            ChainFamily::Near => "e2e_p2p_txn_latency_near",
        }
    }
}

impl std::fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChainFamily::Aptos => "aptos",
            ChainFamily::Evm => "evm",
            ChainFamily::Sui => "sui",
            ChainFamily::SuiTransfer => "sui-transfer",
            ChainFamily::Solana => "solana",
            ChainFamily::Near => "near",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "chainprobed", version, about = "Continuous end-to-end transaction latency probe")]
pub struct Cli {
    /// Chain family to probe.
    #[arg(long, env = "CHAIN_FAMILY", value_enum)]
    pub family: ChainFamily,

    /// Value of the `chain_name` label; also picks the default RPC URL.
    #[arg(long, env = "CHAIN_NAME")]
    pub chain_name: String,

    /// Seconds between iterations (fractions allowed).
    #[arg(long, env = "PING_INTERVAL")]
    pub ping_interval: f64,

    /// Node or RPC URL.
    #[arg(long, env = "URL")]
    pub url: Option<String>,

    #[arg(long, env = "ACC1_PRIVATE_KEY", hide = true, hide_env_values = true)]
    pub private_key: Option<String>,

    /// Receiver key (solana, sui-transfer), used when ACC2_ADDR is unset.
    #[arg(long, env = "ACC2_PRIVATE_KEY", hide = true, hide_env_values = true)]
    pub receiver_private_key: Option<String>,

    /// Expected sender address (evm); checked against the key.
    #[arg(long, env = "ACC1_ADDR")]
    pub sender: Option<String>,

    /// Receiver address (aptos, evm, solana, sui-transfer).
    #[arg(long, env = "ACC2_ADDR")]
    pub receiver: Option<String>,

    /// Sender account id (near).
    #[arg(long, env = "ACC1_ID")]
    pub sender_id: Option<String>,

    /// Receiver account id (near).
    #[arg(long, env = "ACC2_ID")]
    pub receiver_id: Option<String>,

    /// Amount per transfer in the smallest unit.
    #[arg(long, env = "TRANSFER_AMT", default_value_t = 1)]
    pub transfer_amount: u64,

    /// Gas limit (evm) or max gas amount (aptos).
    #[arg(long, env = "GAS_UNITS")]
    pub gas_units: Option<u64>,

    #[arg(long, env = "GAS_UNIT_PRICE", default_value_t = 100)]
    pub gas_unit_price: u64,

    #[arg(long, env = "GAS_BUDGET", default_value_t = 5_000_000)]
    pub gas_budget: u64,

    /// Package holding `counter::increment` (sui).
    #[arg(long, env = "SMART_CONTRACT")]
    pub package: Option<String>,

    /// Shared counter object id (sui).
    #[arg(long, env = "SHARED_OBJ_ON_CHAIN")]
    pub shared_object: Option<String>,

    /// Wait for checkpoint inclusion after execution (sui, sui-transfer).
    #[arg(long, env = "SUI_WAIT_FOR_FINALITY")]
    pub wait_for_finality: bool,

    /// Commitment a transfer must reach (solana).
    #[arg(long, env = "COMMITMENT_LEVEL", default_value = "confirmed")]
    pub commitment: Commitment,

    /// Seconds to wait for confirmation.
    #[arg(long, env = "CONFIRM_TIMEOUT", default_value_t = 120)]
    pub confirm_timeout: u64,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Per-request timeout in seconds, for chain and metrics calls.
    #[arg(long, env = "RPC_TIMEOUT", default_value_t = 30)]
    pub rpc_timeout: u64,

    /// Base metric name; defaults per family.
    #[arg(long, env = "METRIC_NAME")]
    pub metric_name: Option<String>,

    /// Push job suffix: job = `e2elatency-<tag>`.
    #[arg(long, env = "METRICS_TAG", default_value = "default")]
    pub metrics_tag: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Per-family client settings.
#[derive(Debug)]
pub enum ChainSettings {
    Aptos {
        settings: AptosSettings,
        signer: Ed25519Signer,
    },
    Evm {
        settings: EvmSettings,
        signer: Secp256k1Signer,
    },
    Sui {
        settings: SuiSettings,
        signer: Ed25519Signer,
        wait_for_finality: bool,
    },
    SuiTransfer {
        settings: SuiTransferSettings,
        signer: Ed25519Signer,
    },
    Solana {
        settings: SolanaSettings,
        signer: Ed25519Signer,
    },
    Near {
        settings: NearSettings,
        signer: Ed25519Signer,
    },
}

/// Everything the probe needs, validated.
#[derive(Debug)]
pub struct ProbeConfig {
    pub family: ChainFamily,
    pub chain_name: String,
    pub ping_interval: Duration,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
    pub metric_name: MetricName,
    pub labels: Labels,
    pub job: String,
    pub endpoints: Vec<EndpointConfig>,
    pub chain: ChainSettings,
}

impl ProbeConfig {
    /// Validate `cli` and read the indexed metrics endpoints via `lookup`.
    pub fn from_cli(
        cli: Cli,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let ping_interval = Duration::try_from_secs_f64(cli.ping_interval)
            .ok()
            .filter(|interval| !interval.is_zero())
            .ok_or(ConfigError::PingInterval(cli.ping_interval))?;
        let request_timeout = Duration::from_secs(cli.rpc_timeout);
        let poll = PollPolicy {
            interval: Duration::from_millis(cli.poll_interval_ms),
            timeout: Duration::from_secs(cli.confirm_timeout),
        };

        let metric_name = MetricName::new(
            cli.metric_name
                .clone()
                .unwrap_or_else(|| cli.family.default_metric_name().to_string()),
        )?;
        let labels = Labels::new().with("chain_name", cli.chain_name.clone())?;
        let endpoints = metrics_endpoints(lookup);
        let chain = chain_settings(&cli, request_timeout)?;

        Ok(Self {
            family: cli.family,
            job: format!("e2elatency-{}", cli.metrics_tag),
            chain_name: cli.chain_name,
            ping_interval,
            poll,
            request_timeout,
            metric_name,
            labels,
            endpoints,
            chain,
        })
    }
}

fn parse_key<T>(
    value: &str,
    var: &'static str,
    parse: impl FnOnce(&str) -> Result<T, KeyError>,
) -> Result<T, ConfigError> {
    parse(value).map_err(|source| ConfigError::Key { var, source })
}

fn chain_settings(cli: &Cli, request_timeout: Duration) -> Result<ChainSettings, ConfigError> {
    let family = cli.family;
    let present = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
    let require = |value: &Option<String>, var: &'static str| {
        present(value).ok_or(ConfigError::Missing(var, family))
    };
    let url_or_default = |default: fn(&str) -> Option<&'static str>| match present(&cli.url) {
        Some(url) => Ok(url),
        None => default(&cli.chain_name)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::NoDefaultUrl(cli.chain_name.clone())),
    };
    let sender_key = || require(&cli.private_key, "ACC1_PRIVATE_KEY");

    Ok(match family {
        ChainFamily::Aptos => ChainSettings::Aptos {
            signer: parse_key(&sender_key()?, "ACC1_PRIVATE_KEY", Ed25519Signer::from_hex)?,
            settings: AptosSettings {
                base_url: url_or_default(aptos::default_url)?,
                receiver: require(&cli.receiver, "ACC2_ADDR")?,
                amount: cli.transfer_amount,
                max_gas_amount: cli.gas_units.unwrap_or(1000),
                gas_unit_price: cli.gas_unit_price,
                expiration: Duration::from_secs(30),
                request_timeout,
            },
        },
        ChainFamily::Evm => {
            let url = require(&cli.url, "URL")?;
            let signer = parse_key(&sender_key()?, "ACC1_PRIVATE_KEY", Secp256k1Signer::from_hex)?;
            if let Some(configured) = present(&cli.sender) {
                if !configured.eq_ignore_ascii_case(&signer.address()) {
                    return Err(ConfigError::SenderMismatch {
                        configured,
                        derived: signer.address(),
                    });
                }
            }
            ChainSettings::Evm {
                settings: EvmSettings {
                    url,
                    receiver: require(&cli.receiver, "ACC2_ADDR")?,
                    amount: u128::from(cli.transfer_amount),
                    gas_limit: cli.gas_units,
                    request_timeout,
                },
                signer,
            }
        }
        ChainFamily::Sui => ChainSettings::Sui {
            signer: parse_key(&sender_key()?, "ACC1_PRIVATE_KEY", Ed25519Signer::from_sui_keystore)?,
            settings: SuiSettings {
                url: url_or_default(sui::default_url)?,
                package: require(&cli.package, "SMART_CONTRACT")?,
                shared_object: require(&cli.shared_object, "SHARED_OBJ_ON_CHAIN")?,
                gas_budget: cli.gas_budget,
                request_timeout,
            },
            wait_for_finality: cli.wait_for_finality,
        },
        ChainFamily::SuiTransfer => {
            let signer =
                parse_key(&sender_key()?, "ACC1_PRIVATE_KEY", Ed25519Signer::from_sui_keystore)?;
            // Without a receiver the sender pays itself.
            let receiver = match (present(&cli.receiver), present(&cli.receiver_private_key)) {
                (Some(address), _) => address,
                (None, Some(key)) => {
                    parse_key(&key, "ACC2_PRIVATE_KEY", Ed25519Signer::from_sui_keystore)?
                        .sui_address()
                }
                (None, None) => signer.sui_address(),
            };
            ChainSettings::SuiTransfer {
                settings: SuiTransferSettings {
                    url: url_or_default(sui::default_url)?,
                    receiver,
                    amount: cli.transfer_amount,
                    gas_budget: cli.gas_budget,
                    wait_for_finality: cli.wait_for_finality,
                    request_timeout,
                },
                signer,
            }
        }
        ChainFamily::Solana => {
            let receiver = match (present(&cli.receiver), present(&cli.receiver_private_key)) {
                (Some(address), _) => address,
                (None, Some(key)) => {
                    parse_key(&key, "ACC2_PRIVATE_KEY", Ed25519Signer::from_base58_keypair)?
                        .base58_public_key()
                }
                (None, None) => return Err(ConfigError::Missing("ACC2_ADDR", family)),
            };
            ChainSettings::Solana {
                signer: parse_key(
                    &sender_key()?,
                    "ACC1_PRIVATE_KEY",
                    Ed25519Signer::from_base58_keypair,
                )?,
                settings: SolanaSettings {
                    url: url_or_default(solana::default_url)?,
                    receiver,
                    lamports: cli.transfer_amount,
                    commitment: cli.commitment,
                    request_timeout,
                },
            }
        }
        ChainFamily::Near => ChainSettings::Near {
            signer: parse_key(&sender_key()?, "ACC1_PRIVATE_KEY", Ed25519Signer::from_near_key)?,
            settings: NearSettings {
                url: url_or_default(near::default_url)?,
                signer_id: require(&cli.sender_id, "ACC1_ID")?,
                receiver_id: require(&cli.receiver_id, "ACC2_ID")?,
                amount: u128::from(cli.transfer_amount),
                request_timeout,
            },
        },
    })
}

/// Read `METRICS_URL`/`METRICS_AUTH_TOKEN`, then `_2`, `_3`, ... Index 1
/// may be absent or incomplete and is then skipped. From index 2 on, the
/// first index without both halves ends the list. Empty values count as
/// unset.
pub fn metrics_endpoints(lookup: impl Fn(&str) -> Option<String>) -> Vec<EndpointConfig> {
    let read = |var: &str| lookup(var).filter(|v| !v.is_empty());
    let mut endpoints = Vec::new();

    for index in 1u32.. {
        let suffix = if index == 1 {
            String::new()
        } else {
            format!("_{index}")
        };
        let url_var = format!("METRICS_URL{suffix}");
        let token_var = format!("METRICS_AUTH_TOKEN{suffix}");

        match (read(&url_var), read(&token_var)) {
            (Some(url), Some(token)) => endpoints.push(EndpointConfig::new(url, token)),
            (None, None) if index == 1 => continue,
            (None, None) => break,
            _ if index == 1 => {
                warn!(%url_var, %token_var, "incomplete metrics endpoint skipped");
            }
            _ => {
                warn!(%url_var, %token_var, "incomplete metrics endpoint ends the list");
                break;
            }
        }
    }
    endpoints
}
