//! Per-identity submission lanes.
//!
//! The entry point only advances `getNonce` once a bundle lands, so an operation built while an
//! earlier one from the same account still sits in the bundler's mempool would read the same
//! nonce and be dropped as a replacement. Each account gets its own lane: an async lock plus the
//! account's [`AccountSequence`], so operations are built one at a time and each one continues
//! from the last nonce the bundler accepted. Different accounts never wait on each other.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use dashmap::DashMap;
use gasless_intent_types::{CallPayload, ExecutionOutcome};
use tokio::sync::Mutex;

use crate::{executor::Dispatch, identity_store::Identity};

/// What a lane remembers about operations it already handed to a bundler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountSequence {
    last_issued: Option<U256>,
}

impl AccountSequence {
    /// Nonce for the next operation given the entry point's current `getNonce`.
    pub fn next_nonce(&self, on_chain: U256) -> U256 {
        match self.last_issued {
            Some(last) => on_chain.max(last.saturating_add(U256::from(1u8))),
            None => on_chain,
        }
    }

    /// An earlier operation from this lane is pending and carries the account deployment, so a
    /// still-empty account must not be deployed twice.
    pub fn deployment_pending(&self) -> bool {
        self.last_issued.is_some()
    }

    /// Record an operation the bundler accepted.
    pub fn issued(&mut self, nonce: U256) {
        self.last_issued = Some(self.last_issued.map_or(nonce, |last| last.max(nonce)));
    }
}

#[derive(Debug, Default)]
pub struct SubmissionQueue {
    lanes: DashMap<Address, Arc<Mutex<AccountSequence>>>,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit through `dispatcher`, waiting for any in-flight submission from the same account.
    pub async fn submit<D>(
        &self,
        dispatcher: &D,
        identity: &Identity,
        payload: CallPayload,
    ) -> ExecutionOutcome
    where
        D: Dispatch + ?Sized,
    {
        let lane = self
            .lanes
            .entry(identity.smart_account)
            .or_default()
            .clone();
        let mut sequence = lane.lock().await;
        dispatcher.submit_in_sequence(identity, payload, &mut *sequence).await
    }
}
