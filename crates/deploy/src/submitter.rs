//! Journaled submission of transactions.

use alloy_core::primitives::Address;

use crate::{ChainBackend, EcosystemState, ProvisionError, Receipt, Result, StateStore, Submission};

/// Sends transactions for the deployer and persists each hash before awaiting its receipt.
///
/// A run interrupted between send and receipt leaves the hash pending in the state. The next
/// run confirms that transaction instead of sending a second one.
pub(crate) struct Submitter<'a, B> {
    backend: &'a B,
    deployer: Address,
    store: Option<&'a StateStore>,
}

impl<B> Clone for Submitter<'_, B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend,
            deployer: self.deployer,
            store: self.store,
        }
    }
}

impl<'a, B: ChainBackend> Submitter<'a, B> {
    pub(crate) fn new(backend: &'a B, deployer: Address, store: Option<&'a StateStore>) -> Self {
        Self {
            backend,
            deployer,
            store,
        }
    }

    pub(crate) fn persist(&self, state: &EcosystemState) -> Result<()> {
        match self.store {
            Some(store) => store.save(state),
            None => Ok(()),
        }
    }

    /// Submit the transaction establishing `fact`, or confirm the one already sent for it.
    pub(crate) async fn submit(
        &self,
        state: &mut EcosystemState,
        fact: &str,
        submission: Submission<'_>,
        budget: u64,
    ) -> Result<Receipt> {
        let tx_hash = match state.pending(fact) {
            Some(tx_hash) => {
                tracing::info!(fact, %tx_hash, "Awaiting transaction sent by a previous run");
                tx_hash
            }
            None => {
                let tx_hash = self.backend.send(submission, self.deployer, budget).await?;
                state.record_pending(fact, tx_hash)?;
                self.persist(state)?;
                tx_hash
            }
        };

        match self.backend.confirm(submission, tx_hash, budget).await {
            Ok(receipt) => {
                state.clear_pending(fact);
                Ok(receipt)
            }
            // Outcome unknown: keep the hash so a rerun waits on it.
            Err(err @ ProvisionError::Transport(_)) => {
                tracing::warn!(fact, %tx_hash, "Transaction not confirmed, left pending");
                Err(err)
            }
            Err(err) => {
                state.clear_pending(fact);
                self.persist(state)?;
                Err(err)
            }
        }
    }
}
