//! Object-model mutation adapter (shared/owned object chains, e.g. Sui).

use std::future::Future;

use tracing::debug;

use crate::adapter::{AdapterKind, ChainAdapter};
use crate::error::ProbeResult;
use crate::outcome::{PhaseTimeline, ProbeOutcome, phase};
use crate::poll::{PollPolicy, poll_until};

/// A shared object as resolved right before building the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedObjectRef {
    pub object_id: String,
    pub initial_shared_version: u64,
    pub version: u64,
}

/// Fee-payment object returned by a previous execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasHandle {
    pub object_id: String,
}

/// What an executed transaction reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub digest: String,
    pub gas: Option<GasHandle>,
}

/// Chain surface needed by [`ObjectMutationAdapter`].
pub trait ObjectClient: Send + Sync {
    type Transaction: Send;

    fn resolve_shared_object(&self) -> impl Future<Output = ProbeResult<SharedObjectRef>> + Send;

    /// Build the mutation call. `gas` is a hint; `None` lets the node
    /// select a fee-payment object.
    fn build_call(
        &self,
        object: &SharedObjectRef,
        gas: Option<&GasHandle>,
    ) -> impl Future<Output = ProbeResult<Self::Transaction>> + Send;

    fn sign_and_execute(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = ProbeResult<Execution>> + Send;

    /// Checkpoint that includes `digest`, `None` while not yet assigned.
    fn checkpoint(&self, digest: &str) -> impl Future<Output = ProbeResult<Option<u64>>> + Send;
}

/// Probe adapter for object-model chains.
///
/// Timeline: `start` (after resolving the shared object) → `build` →
/// `submit` → `confirm` (only when waiting for finality). The gas object
/// returned by a successful execution is reused for the next build; any
/// failure drops it so a stale handle cannot fail the next iteration.
pub struct ObjectMutationAdapter<C> {
    client: C,
    poll: PollPolicy,
    wait_for_finality: bool,
    gas: Option<GasHandle>,
}

impl<C: ObjectClient> ObjectMutationAdapter<C> {
    pub fn new(client: C, poll: PollPolicy, wait_for_finality: bool) -> Self {
        Self {
            client,
            poll,
            wait_for_finality,
            gas: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Gas handle that the next build will reuse, if any.
    pub fn cached_gas(&self) -> Option<&GasHandle> {
        self.gas.as_ref()
    }

    async fn attempt(&mut self) -> ProbeResult<PhaseTimeline> {
        let object = self.client.resolve_shared_object().await?;

        let mut timeline = PhaseTimeline::start();
        let transaction = self.client.build_call(&object, self.gas.as_ref()).await?;
        timeline.mark(phase::BUILD);

        let execution = self.client.sign_and_execute(transaction).await?;
        timeline.mark(phase::SUBMIT);
        debug!(
            object = %object.object_id,
            version = object.version,
            digest = %execution.digest,
            "call executed"
        );
        self.gas = execution.gas;

        if self.wait_for_finality {
            let client = &self.client;
            let digest = execution.digest.as_str();
            let checkpoint = poll_until(self.poll, || async move { client.checkpoint(digest).await })
                .await?;
            timeline.mark(phase::CONFIRM);
            debug!(%digest, checkpoint, "call finalized");
        }

        Ok(timeline)
    }
}

impl<C: ObjectClient> ChainAdapter for ObjectMutationAdapter<C> {
    fn kind(&self) -> AdapterKind {
        AdapterKind::ObjectMutation
    }

    async fn run_once(&mut self) -> ProbeOutcome {
        let result = self.attempt().await;
        if result.is_err() {
            self.gas = None;
        }
        result.into()
    }
}
