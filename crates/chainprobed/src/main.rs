//! chainprobed — continuous end-to-end transaction latency probe.
//!
//! One process probes one chain: it loads configuration, builds the chain
//! client and adapter for the configured family, and runs the probe loop
//! until interrupted.
//!
//! # Usage
//!
//! ```text
//! CHAIN_FAMILY=evm CHAIN_NAME=sepolia PING_INTERVAL=10 URL=http://localhost:8545 \
//! ACC1_PRIVATE_KEY=0x... ACC2_ADDR=0x... METRICS_URL=https://vm.example METRICS_AUTH_TOKEN=... \
//!   chainprobed
//! ```

mod config;

use chainprobe_chain::{
    AccountTransferAdapter, AptosClient, ChainAdapter, EvmClient, LedgerTransferAdapter,
    NearClient, ObjectMutationAdapter, SolanaClient, SuiClient, SuiTransferClient,
};
use chainprobe_engine::{LoopConfig, ProbeLoop, ProbeMetrics};
use chainprobe_metrics::{HttpPushTransport, MetricsSink, PushTransport};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{ChainSettings, Cli, LogFormat, ProbeConfig};

const DEFAULT_FILTER: &str = "info,chainprobed=debug,chainprobe=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = ProbeConfig::from_cli(cli, |var| std::env::var(var).ok())?;
    info!(
        family = %config.family,
        chain = %config.chain_name,
        metric = %config.metric_name,
        job = %config.job,
        endpoints = config.endpoints.len(),
        "chainprobed starting"
    );

    let transport = HttpPushTransport::new(config.request_timeout)?;
    let sink = MetricsSink::new(config.endpoints.clone(), config.job.clone(), transport);
    let metrics = ProbeMetrics::new(config.metric_name.clone(), config.labels.clone())?;
    let loop_config = LoopConfig {
        chain_name: config.chain_name.clone(),
        interval: config.ping_interval,
    };

    match config.chain {
        ChainSettings::Aptos { settings, signer } => {
            let client = AptosClient::new(settings, signer)?;
            info!(sender = client.sender(), "aptos client ready");
            let adapter = AccountTransferAdapter::new(client, config.poll);
            run(adapter, sink, metrics, loop_config).await
        }
        ChainSettings::Evm { settings, signer } => {
            let client = EvmClient::new(settings, signer)?;
            info!(sender = client.sender(), "evm client ready");
            let adapter = LedgerTransferAdapter::new(client, config.poll);
            run(adapter, sink, metrics, loop_config).await
        }
        ChainSettings::Sui {
            settings,
            signer,
            wait_for_finality,
        } => {
            let client = SuiClient::new(settings, signer)?;
            info!(sender = client.sender(), wait_for_finality, "sui client ready");
            let adapter = ObjectMutationAdapter::new(client, config.poll, wait_for_finality);
            run(adapter, sink, metrics, loop_config).await
        }
        ChainSettings::SuiTransfer { settings, signer } => {
            let client = SuiTransferClient::new(settings, signer)?;
            info!(sender = client.sender(), "sui transfer client ready");
            let adapter = AccountTransferAdapter::new(client, config.poll);
            run(adapter, sink, metrics, loop_config).await
        }
        ChainSettings::Solana { settings, signer } => {
            let commitment = settings.commitment;
            let client = SolanaClient::new(settings, signer)?;
            info!(sender = %client.sender(), %commitment, "solana client ready");
            let adapter = AccountTransferAdapter::new(client, config.poll);
            run(adapter, sink, metrics, loop_config).await
        }
        ChainSettings::Near { settings, signer } => {
            let client = NearClient::new(settings, signer)?;
            info!(sender = client.signer_id(), "near client ready");
            let adapter = AccountTransferAdapter::new(client, config.poll);
            run(adapter, sink, metrics, loop_config).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// Run the loop until Ctrl-C. The in-flight iteration is dropped.
async fn run<A: ChainAdapter, T: PushTransport>(
    adapter: A,
    sink: MetricsSink<T>,
    metrics: ProbeMetrics,
    config: LoopConfig,
) -> anyhow::Result<()> {
    let mut probe = ProbeLoop::new(adapter, sink, metrics, config);

    tokio::select! {
        _ = probe.run() => {}
        signal = tokio::signal::ctrl_c() => signal?,
    }
    info!(iterations = probe.iterations(), "shutdown signal received, exiting");
    Ok(())
}
