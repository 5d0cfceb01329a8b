use core::fmt;

use alloy_primitives::{Address, Bytes, B256, U256};

/// What the caller wants done, before any chain-specific encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionIntent {
    NativeTransfer { receiver: Address, amount: U256 },
    /// `amount` is in the token's smallest unit.
    TokenTransfer { token: Address, receiver: Address, amount: U256 },
    NftMint { contract: Address, receiver: Address },
}

impl TransactionIntent {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionIntent::NativeTransfer { .. } => "native-transfer",
            TransactionIntent::TokenTransfer { .. } => "token-transfer",
            TransactionIntent::NftMint { .. } => "nft-mint",
        }
    }
}

/// A single call executed by the smart account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallPayload {
    pub destination: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Failure classes reported by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    NetworkUnreachable,
    SponsorshipDenied,
    Submission,
    MalformedOperation,
    InsufficientData,
    Timeout,
}

impl FailureKind {
    /// Failures where a later attempt can plausibly succeed without changing the operation.
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::NetworkUnreachable | FailureKind::Timeout)
    }
}

/// Result of one dispatch.
///
/// `Submitted::reference` is the bundler's user-operation hash. It identifies the operation for
/// later lookup; it says nothing about inclusion. `transaction_hash` is only known when the
/// dispatcher waited for the bundle carrying the operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Submitted {
        reference: String,
        transaction_hash: Option<B256>,
    },
    Failed { kind: FailureKind, reason: String },
}

impl ExecutionOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, ExecutionOutcome::Submitted { .. })
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Submitted {
                reference,
                transaction_hash: Some(tx),
            } => write!(f, "submitted {reference} in {tx}"),
            ExecutionOutcome::Submitted { reference, .. } => write!(f, "submitted {reference}"),
            ExecutionOutcome::Failed { reason, .. } => write!(f, "failed: {reason}"),
        }
    }
}
