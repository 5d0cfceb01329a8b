use std::path::PathBuf;

use alloy_primitives::Address;
use gasless_intent_types::FailureKind;
use thiserror::Error;

use crate::executor::Stage;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("identity store {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("identity record is corrupt: {0}")]
    Corrupt(String),
    #[error("stored {field} {stored} does not match {derived} derived from the stored key")]
    AddressMismatch {
        field: &'static str,
        stored: Address,
        derived: Address,
    },
    #[error("smart account address cannot be resolved: {0}")]
    Underivable(String),
    #[error("failed writing identity store {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Caller-supplied intent parameters that cannot be encoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid amount {amount:?}: {reason}")]
    InvalidAmount { amount: String, reason: String },
}

/// Classified failure of one `submit`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("sponsorship denied: {0}")]
    SponsorshipDenied(String),
    #[error("submission rejected: {0}")]
    SubmissionError(String),
    #[error("malformed operation: {0}")]
    MalformedOperation(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("timeout after {secs}s waiting on the {stage} endpoint")]
    Timeout { stage: Stage, secs: u64 },
}

impl DispatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::NetworkUnreachable(_) => FailureKind::NetworkUnreachable,
            DispatchError::SponsorshipDenied(_) => FailureKind::SponsorshipDenied,
            DispatchError::SubmissionError(_) => FailureKind::Submission,
            DispatchError::MalformedOperation(_) => FailureKind::MalformedOperation,
            DispatchError::InsufficientData(_) => FailureKind::InsufficientData,
            DispatchError::Timeout { .. } => FailureKind::Timeout,
        }
    }
}

/// Fatal errors that stop a run before anything is submitted.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
