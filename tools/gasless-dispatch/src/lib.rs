//! Identity bootstrap and sponsored ERC-4337 dispatch.
//!
//! `identity_store` owns the persisted owner key, `executor` turns a call payload into a
//! sponsored, signed user operation and hands it to a bundler, and `orchestrator` strings the two
//! together with the intent encoder for a single run.

pub mod config;
pub mod errors;
pub mod executor;
pub mod identity_store;
pub mod logging;
pub mod orchestrator;
pub mod queue;

pub use errors::{DispatchError, EncodingError, PersistenceError, RunError};
pub use executor::{Dispatch, EndpointUrls, SponsoredExecutor, Stage, Submission};
pub use identity_store::{
    AccountResolver, Identity, IdentityRecord, IdentityRecordStore, IdentityStore, JsonFileStore,
    MemoryStore,
};
pub use orchestrator::{run_once, Orchestrator, RetryPolicy};
pub use queue::{AccountSequence, SubmissionQueue};
