//! Types shared by the intent encoder and the sponsored dispatcher.
//!
//! Everything here is plain data: intents, the call payloads they compile to, the ERC-4337
//! user operation that carries a payload to a bundler, and the deployment parameters that pin
//! a run to one network.

pub mod abi;
pub mod deployment;
pub mod intents;
pub mod user_op;

pub use deployment::DeploymentConfig;
pub use intents::{CallPayload, ExecutionOutcome, FailureKind, TransactionIntent};
pub use user_op::{IncludedTransaction, SponsorshipTerms, UserOperation, UserOperationReceipt};
