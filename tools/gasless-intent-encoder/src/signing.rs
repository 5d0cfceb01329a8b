//! User-operation hashing and owner signatures (EntryPoint v0.6 / `SimpleAccount`).

use alloy_primitives::{eip191_hash_message, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use k256::ecdsa::SigningKey;

use gasless_intent_types::UserOperation;

/// `EntryPoint.getUserOpHash(op)`:
/// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`.
///
/// `pack` replaces the dynamic fields with their hashes and drops the signature.
pub fn user_operation_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> B256 {
    let packed = (
        op.sender,
        op.nonce,
        keccak256(&op.init_code),
        keccak256(&op.call_data),
        op.call_gas_limit,
        op.verification_gas_limit,
        op.pre_verification_gas,
        op.max_fee_per_gas,
        op.max_priority_fee_per_gas,
        keccak256(&op.paymaster_and_data),
    )
        .abi_encode();

    keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
}

/// Sign the operation hash as an EIP-191 personal message and write the 65-byte
/// signature (r||s||v) into `op.signature`.
///
/// Must run after sponsorship: the paymaster data and gas limits are part of the hash.
pub fn sign_user_operation(
    op: &mut UserOperation,
    signing_key: &SigningKey,
    entry_point: Address,
    chain_id: u64,
) -> Result<B256, k256::ecdsa::Error> {
    let hash = user_operation_hash(op, entry_point, chain_id);
    let digest = eip191_hash_message(hash);
    let (signature, recovery_id) = signing_key.sign_prehash_recoverable(digest.as_slice())?;

    let mut sig_bytes = Vec::with_capacity(65);
    sig_bytes.extend_from_slice(&signature.to_bytes());
    sig_bytes.push(27 + recovery_id.to_byte());
    op.signature = sig_bytes.into();
    Ok(hash)
}

/// Well-formed placeholder signature used while the operation is simulated and sponsored.
///
/// `SimpleAccount` validation runs `ecrecover` during estimation, so the placeholder has to
/// parse as a signature even though it recovers to nobody.
pub fn dummy_signature() -> Bytes {
    let mut sig = [0u8; 65];
    sig[..15].fill(0xff);
    sig[15] = 0xf0;
    sig[32] = 0x7a;
    sig[33..64].fill(0xaa);
    sig[64] = 0x1c;
    Bytes::copy_from_slice(&sig)
}
