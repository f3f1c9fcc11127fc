//! Account-based transfer adapter: one preflight read, then build, sign,
//! submit and wait for commitment.

use std::fmt;
use std::future::Future;

use tracing::debug;

use crate::adapter::{AdapterKind, ChainAdapter};
use crate::error::ProbeResult;
use crate::outcome::{PhaseTimeline, ProbeOutcome, phase};
use crate::poll::{PollPolicy, poll_until};

/// Chain surface needed by [`AccountTransferAdapter`].
pub trait AccountClient: Send + Sync {
    /// Replay-protection input read before the measured window: an
    /// account sequence number, an access key nonce with a block hash, a
    /// recent blockhash or the coin paying for the transfer.
    type Preflight: Send + fmt::Debug;

    /// Unsigned transaction produced by the build step.
    type Transaction: Send;

    fn preflight(&self) -> impl Future<Output = ProbeResult<Self::Preflight>> + Send;

    /// Build a transfer from the preflight read.
    fn build_transfer(
        &self,
        preflight: Self::Preflight,
    ) -> impl Future<Output = ProbeResult<Self::Transaction>> + Send;

    /// Sign and submit, returning the transaction hash.
    fn sign_and_submit(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = ProbeResult<String>> + Send;

    /// `Ok(true)` once committed successfully, `Ok(false)` while pending.
    /// A committed-but-failed transaction is [`crate::ProbeError::Rejected`].
    fn is_committed(&self, tx_hash: &str) -> impl Future<Output = ProbeResult<bool>> + Send;
}

/// Probe adapter for account chains.
///
/// Timeline: `start` (after the preflight read) → `build` → `submit` →
/// `confirm`.
pub struct AccountTransferAdapter<C> {
    client: C,
    poll: PollPolicy,
}

impl<C: AccountClient> AccountTransferAdapter<C> {
    pub fn new(client: C, poll: PollPolicy) -> Self {
        Self { client, poll }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    async fn attempt(&self) -> ProbeResult<PhaseTimeline> {
        let preflight = self.client.preflight().await?;
        debug!(?preflight, "preflight read");

        let mut timeline = PhaseTimeline::start();
        let transaction = self.client.build_transfer(preflight).await?;
        timeline.mark(phase::BUILD);

        let tx_hash = self.client.sign_and_submit(transaction).await?;
        timeline.mark(phase::SUBMIT);
        debug!(%tx_hash, "transfer submitted");

        let client = &self.client;
        let hash = tx_hash.as_str();
        poll_until(self.poll, || async move {
            Ok(client.is_committed(hash).await?.then_some(()))
        })
        .await?;
        timeline.mark(phase::CONFIRM);

        Ok(timeline)
    }
}

impl<C: AccountClient> ChainAdapter for AccountTransferAdapter<C> {
    fn kind(&self) -> AdapterKind {
        AdapterKind::AccountTransfer
    }

    async fn run_once(&mut self) -> ProbeOutcome {
        self.attempt().await.into()
    }
}
