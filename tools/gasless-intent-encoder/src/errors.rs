use alloy_primitives::hex;
use thiserror::Error;

/// Errors while turning call data back into an intent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown selector 0x{}", hex::encode(.0))]
    UnknownSelector([u8; 4]),
    #[error("call data shorter than a selector")]
    Truncated,
    #[error("abi decoding failed: {0}")]
    Abi(String),
}
