//! One dispatch run: identity, intent, encoding, submission, report.

use std::time::Duration;

use futures::future::join_all;
use gasless_intent_encoder::encode;
use gasless_intent_types::{ExecutionOutcome, TransactionIntent};
use tracing::{error, info, warn};

use crate::{
    errors::{EncodingError, RunError},
    executor::Dispatch,
    identity_store::{AccountResolver, Identity, IdentityRecordStore, IdentityStore},
    queue::SubmissionQueue,
};

/// Re-submission policy for transient failures (unreachable endpoint, timeout).
///
/// The executor itself never retries; this is the scheduling layer's decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

pub struct Orchestrator<D> {
    dispatcher: D,
    queue: SubmissionQueue,
    retry: RetryPolicy,
    explorer_url: Option<String>,
}

impl<D: Dispatch> Orchestrator<D> {
    pub fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
            queue: SubmissionQueue::new(),
            retry: RetryPolicy::default(),
            explorer_url: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_explorer(mut self, explorer_url: Option<String>) -> Self {
        self.explorer_url = explorer_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Encode and submit one intent.
    pub async fn dispatch(
        &self,
        identity: &Identity,
        intent: &TransactionIntent,
    ) -> ExecutionOutcome {
        let payload = encode(intent);
        info!(
            intent = intent.label(),
            destination = %payload.destination,
            value = %payload.value,
            data_len = payload.data.len(),
            "dispatching intent"
        );

        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = self
                .queue
                .submit(&self.dispatcher, identity, payload.clone())
                .await;
            match &outcome {
                ExecutionOutcome::Failed { kind, reason }
                    if kind.is_transient() && attempt < attempts =>
                {
                    warn!(attempt, max_attempts = attempts, %reason, "transient failure, retrying");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                _ => return outcome,
            }
        }
    }

    /// Dispatch independent intents for one identity. Submissions for the same account are
    /// serialised by the queue; each outcome is reported on its own.
    pub async fn dispatch_all(
        &self,
        identity: &Identity,
        intents: &[TransactionIntent],
    ) -> Vec<ExecutionOutcome> {
        join_all(intents.iter().map(|intent| self.dispatch(identity, intent))).await
    }

    /// Explorer page of the bundle transaction, once one is known and an explorer is set.
    pub fn explorer_link(&self, outcome: &ExecutionOutcome) -> Option<String> {
        match (outcome, &self.explorer_url) {
            (
                ExecutionOutcome::Submitted {
                    transaction_hash: Some(tx),
                    ..
                },
                Some(explorer),
            ) => Some(format!("{explorer}/{tx}")),
            _ => None,
        }
    }

    /// Log the outcome. Returns whether the intent was submitted.
    pub fn report(&self, outcome: &ExecutionOutcome) -> bool {
        match outcome {
            ExecutionOutcome::Submitted {
                reference,
                transaction_hash,
            } => {
                match transaction_hash {
                    Some(tx) => info!(%reference, %tx, "transaction successfully sponsored"),
                    None => info!(%reference, "transaction successfully sponsored"),
                }
                if let Some(link) = self.explorer_link(outcome) {
                    info!("view on explorer: {link}");
                }
                true
            }
            ExecutionOutcome::Failed { kind, reason } => {
                error!(?kind, %reason, "dispatch failed");
                false
            }
        }
    }
}

/// Bootstrap the identity, pick the intent and dispatch it.
///
/// Persistence and encoding errors abort the run before anything reaches the network.
pub async fn run_once<S, R, D, F>(
    identities: &IdentityStore<S, R>,
    orchestrator: &Orchestrator<D>,
    select: F,
) -> Result<ExecutionOutcome, RunError>
where
    S: IdentityRecordStore,
    R: AccountResolver,
    D: Dispatch,
    F: FnOnce(&Identity) -> Result<TransactionIntent, EncodingError>,
{
    let identity = identities.load_or_create().await?;
    info!(owner = %identity.owner, smart_wallet = %identity.smart_account, "identity ready");

    let intent = select(&identity)?;
    Ok(orchestrator.dispatch(&identity, &intent).await)
}
