use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

use gasless_intent_types::abi::{IERC20, INftMinter, ISimpleAccount, ISimpleAccountFactory};
use gasless_intent_types::{CallPayload, DeploymentConfig, TransactionIntent};

use crate::errors::DecodeError;

/// Compile an intent into the call the smart account will make.
///
/// Only `NativeTransfer` moves value and only it leaves `data` empty; the contract-call variants
/// always carry a zero value.
pub fn encode(intent: &TransactionIntent) -> CallPayload {
    match intent {
        TransactionIntent::NativeTransfer { receiver, amount } => CallPayload {
            destination: *receiver,
            data: Bytes::new(),
            value: *amount,
        },
        TransactionIntent::TokenTransfer { token, receiver, amount } => CallPayload {
            destination: *token,
            data: IERC20::transferCall {
                to: *receiver,
                amount: *amount,
            }
            .abi_encode()
            .into(),
            value: U256::ZERO,
        },
        TransactionIntent::NftMint { contract, receiver } => CallPayload {
            destination: *contract,
            data: INftMinter::mintCall { to: *receiver }.abi_encode().into(),
            value: U256::ZERO,
        },
    }
}

/// Recover the intent a payload was compiled from.
pub fn decode_payload(payload: &CallPayload) -> Result<TransactionIntent, DecodeError> {
    if payload.data.is_empty() {
        return Ok(TransactionIntent::NativeTransfer {
            receiver: payload.destination,
            amount: payload.value,
        });
    }
    if payload.data.len() < 4 {
        return Err(DecodeError::Truncated);
    }

    let mut selector = [0u8; 4];
    selector.copy_from_slice(&payload.data[..4]);
    if selector == IERC20::transferCall::SELECTOR {
        let call = IERC20::transferCall::abi_decode(&payload.data, true)
            .map_err(|e| DecodeError::Abi(e.to_string()))?;
        Ok(TransactionIntent::TokenTransfer {
            token: payload.destination,
            receiver: call.to,
            amount: call.amount,
        })
    } else if selector == INftMinter::mintCall::SELECTOR {
        let call = INftMinter::mintCall::abi_decode(&payload.data, true)
            .map_err(|e| DecodeError::Abi(e.to_string()))?;
        Ok(TransactionIntent::NftMint {
            contract: payload.destination,
            receiver: call.to,
        })
    } else {
        Err(DecodeError::UnknownSelector(selector))
    }
}

/// `SimpleAccount.execute(dest, value, func)`: the user operation's `callData` for one payload.
pub fn wrap_execute(payload: &CallPayload) -> Bytes {
    ISimpleAccount::executeCall {
        dest: payload.destination,
        value: payload.value,
        func: payload.data.clone(),
    }
    .abi_encode()
    .into()
}

/// `SimpleAccount.executeBatch(dest[], func[])`.
///
/// The v0.6 batch entrypoint carries no per-call value, so payloads that move native currency
/// are rejected and must go through [`wrap_execute`] one at a time.
pub fn wrap_execute_batch(payloads: &[CallPayload]) -> Option<Bytes> {
    if payloads.iter().any(|p| !p.value.is_zero()) {
        return None;
    }
    let call = ISimpleAccount::executeBatchCall {
        dest: payloads.iter().map(|p| p.destination).collect(),
        func: payloads.iter().map(|p| p.data.clone()).collect(),
    };
    Some(call.abi_encode().into())
}

/// `initCode` for a not-yet-deployed account: `factory || createAccount(owner, salt)`.
pub fn init_code(owner: Address, deployment: &DeploymentConfig) -> Bytes {
    let call = ISimpleAccountFactory::createAccountCall {
        owner,
        salt: deployment.account_salt,
    }
    .abi_encode();

    let mut buf = Vec::with_capacity(20 + call.len());
    buf.extend_from_slice(deployment.factory.as_slice());
    buf.extend_from_slice(&call);
    buf.into()
}
