//! Ledger transfer adapter (nonce-based accounts, e.g. EVM chains).

use std::future::Future;

use tracing::debug;

use crate::adapter::{AdapterKind, ChainAdapter};
use crate::error::{ProbeError, ProbeResult};
use crate::outcome::{PhaseTimeline, ProbeOutcome, phase};
use crate::poll::{PollPolicy, poll_until};

/// Fee fields of one transfer, resolved before the measured window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerTransfer {
    pub nonce: u64,
    pub gas_price: u128,
}

/// Transaction receipt as far as the probe cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// Block that includes the transaction; `None` while pending.
    pub block_number: Option<u64>,
    pub succeeded: bool,
}

/// Chain surface needed by [`LedgerTransferAdapter`].
pub trait LedgerClient: Send + Sync {
    fn nonce(&self) -> impl Future<Output = ProbeResult<u64>> + Send;

    /// Current fee baseline, before any uplift.
    fn gas_price(&self) -> impl Future<Output = ProbeResult<u128>> + Send;

    /// Sign and broadcast, returning the transaction hash.
    fn sign_and_send(
        &self,
        transfer: LedgerTransfer,
    ) -> impl Future<Output = ProbeResult<String>> + Send;

    /// `Ok(None)` or [`ProbeError::NotFoundYet`] while the receipt is not
    /// available.
    fn receipt(&self, tx_hash: &str) -> impl Future<Output = ProbeResult<Option<Receipt>>> + Send;
}

/// Raise the observed fee baseline by 10%, rounded down, so the probe
/// does not get stuck behind a fee bump.
pub fn uplift_fee(base: u128) -> u128 {
    base.saturating_add(base / 10)
}

/// Probe adapter for nonce-based ledgers.
///
/// Timeline: `start` (after nonce and fee lookups) → `submit` →
/// `confirm`. There is no separate build phase.
pub struct LedgerTransferAdapter<C> {
    client: C,
    poll: PollPolicy,
}

impl<C: LedgerClient> LedgerTransferAdapter<C> {
    pub fn new(client: C, poll: PollPolicy) -> Self {
        Self { client, poll }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    async fn attempt(&self) -> ProbeResult<PhaseTimeline> {
        let gas_price = uplift_fee(self.client.gas_price().await?);
        let nonce = self.client.nonce().await?;

        let mut timeline = PhaseTimeline::start();
        let tx_hash = self
            .client
            .sign_and_send(LedgerTransfer { nonce, gas_price })
            .await?;
        timeline.mark(phase::SUBMIT);
        debug!(nonce, gas_price, %tx_hash, "transfer broadcast");

        let receipt = self.await_receipt(&tx_hash).await?;
        timeline.mark(phase::CONFIRM);

        if !receipt.succeeded {
            return Err(ProbeError::Rejected(format!(
                "{tx_hash} reverted in block {}",
                receipt.block_number.unwrap_or_default()
            )));
        }
        Ok(timeline)
    }

    /// Poll until a receipt with a block reference shows up or the
    /// confirmation timeout elapses.
    async fn await_receipt(&self, tx_hash: &str) -> ProbeResult<Receipt> {
        let client = &self.client;
        poll_until(self.poll, || async move {
            match client.receipt(tx_hash).await? {
                Some(receipt) if receipt.block_number.is_some() => Ok(Some(receipt)),
                Some(_) => {
                    debug!(%tx_hash, "transaction pending");
                    Ok(None)
                }
                None => Err(ProbeError::NotFoundYet(tx_hash.to_string())),
            }
        })
        .await
    }
}

impl<C: LedgerClient> ChainAdapter for LedgerTransferAdapter<C> {
    fn kind(&self) -> AdapterKind {
        AdapterKind::LedgerTransfer
    }

    async fn run_once(&mut self) -> ProbeOutcome {
        self.attempt().await.into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;

    /// Returns "not found" for the first `missing_polls` receipt queries.
    struct MockLedger {
        missing_polls: Option<u32>,
        reverted: bool,
        sent: Mutex<Vec<LedgerTransfer>>,
        polls: Mutex<u32>,
    }

    impl MockLedger {
        fn found_after(polls: u32) -> Self {
            Self {
                missing_polls: Some(polls),
                reverted: false,
                sent: Mutex::new(Vec::new()),
                polls: Mutex::new(0),
            }
        }

        fn never_found() -> Self {
            Self {
                missing_polls: None,
                ..Self::found_after(0)
            }
        }

        fn poll_count(&self) -> u32 {
            *self.polls.lock().unwrap()
        }
    }

    impl LedgerClient for MockLedger {
        async fn nonce(&self) -> ProbeResult<u64> {
            Ok(7)
        }

        async fn gas_price(&self) -> ProbeResult<u128> {
            Ok(1_000_000_007)
        }

        async fn sign_and_send(&self, transfer: LedgerTransfer) -> ProbeResult<String> {
            self.sent.lock().unwrap().push(transfer);
            Ok("0xfeed".to_string())
        }

        async fn receipt(&self, _tx_hash: &str) -> ProbeResult<Option<Receipt>> {
            let poll = {
                let mut polls = self.polls.lock().unwrap();
                *polls += 1;
                *polls
            };
            match self.missing_polls {
                Some(missing) if poll > missing => Ok(Some(Receipt {
                    block_number: Some(100),
                    succeeded: !self.reverted,
                })),
                _ if poll % 2 == 0 => Err(ProbeError::NotFoundYet("0xfeed".into())),
                _ => Ok(None),
            }
        }
    }

    fn policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn fee_uplift_rounds_down() {
        assert_eq!(uplift_fee(100), 110);
        assert_eq!(uplift_fee(1_000_000_007), 1_100_000_007);
        assert_eq!(uplift_fee(9), 9);
        assert_eq!(uplift_fee(0), 0);
        assert_eq!(uplift_fee(u128::MAX), u128::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_when_receipt_arrives_before_timeout() {
        let mut adapter = LedgerTransferAdapter::new(MockLedger::found_after(3), policy());

        let ProbeOutcome::Success { timeline } = adapter.run_once().await else {
            panic!("expected success");
        };
        let names: Vec<_> = timeline.marks().iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["start", "submit", "confirm"]);

        let marks = timeline.marks();
        assert_eq!(marks[2].at - marks[1].at, Duration::from_millis(300));
        assert_eq!(adapter.client().poll_count(), 4);

        let sent = adapter.client().sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![LedgerTransfer {
                nonce: 7,
                gas_price: 1_100_000_007
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_receipt_never_appears() {
        let mut adapter = LedgerTransferAdapter::new(MockLedger::never_found(), policy());
        let started = Instant::now();

        let outcome = adapter.run_once().await;

        assert_eq!(
            outcome,
            ProbeOutcome::failure("timeout", "confirmation timed out after 500ms")
        );
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert!(adapter.client().poll_count() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_receipt_is_failure() {
        let mut mock = MockLedger::found_after(0);
        mock.reverted = true;
        let mut adapter = LedgerTransferAdapter::new(mock, policy());

        let outcome = adapter.run_once().await;
        assert_eq!(
            outcome,
            ProbeOutcome::failure("rejected", "transaction rejected: 0xfeed reverted in block 100")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pending_receipt_without_block_keeps_polling() {
        struct PendingThenMined(Mutex<u32>);

        impl LedgerClient for PendingThenMined {
            async fn nonce(&self) -> ProbeResult<u64> {
                Ok(0)
            }
            async fn gas_price(&self) -> ProbeResult<u128> {
                Ok(10)
            }
            async fn sign_and_send(&self, _: LedgerTransfer) -> ProbeResult<String> {
                Ok("0x1".into())
            }
            async fn receipt(&self, _: &str) -> ProbeResult<Option<Receipt>> {
                let mut n = self.0.lock().unwrap();
                *n += 1;
                Ok(Some(Receipt {
                    block_number: (*n > 2).then_some(5),
                    succeeded: true,
                }))
            }
        }

        let mut adapter = LedgerTransferAdapter::new(PendingThenMined(Mutex::new(0)), policy());
        assert!(adapter.run_once().await.is_success());
        assert_eq!(*adapter.client().0.lock().unwrap(), 3);
    }
}
