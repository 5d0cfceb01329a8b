//! Off-chain compiler from transaction intents to ERC-4337 call data.
//!
//! Nothing in this crate touches the network: encoding, counterfactual account derivation and
//! user-operation signing are all pure functions of their inputs.

pub mod account;
pub mod encoder;
pub mod errors;
pub mod signing;


pub use account::{derive_smart_account, generate_owner_key, owner_address};
pub use encoder::{decode_payload, encode, init_code, wrap_execute, wrap_execute_batch};
pub use errors::DecodeError;
pub use signing::{dummy_signature, sign_user_operation, user_operation_hash};
