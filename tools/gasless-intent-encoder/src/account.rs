//! Owner key handling and counterfactual smart-account addresses.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::{SolCall, SolValue};
use k256::{ecdsa::SigningKey, elliptic_curve::sec1::ToEncodedPoint};
use rand_core::OsRng;

use gasless_intent_types::abi::ISimpleAccount;
use gasless_intent_types::DeploymentConfig;

/// Fresh owner key from the OS entropy source.
pub fn generate_owner_key() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

/// EOA address of a signing key: low 20 bytes of keccak256 over the uncompressed public key.
pub fn owner_address(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Address `SimpleAccountFactory.getAddress(owner, salt)` would return, or `None` when the
/// deployment carries no proxy creation code.
///
/// CREATE2 from the factory with `salt` as bytes32 over
/// `proxyCreationCode || abi.encode(implementation, initialize(owner))`.
pub fn derive_smart_account(owner: Address, deployment: &DeploymentConfig) -> Option<Address> {
    let proxy_creation_code = deployment.proxy_creation_code.as_ref()?;
    let initialize: Bytes = ISimpleAccount::initializeCall { anOwner: owner }
        .abi_encode()
        .into();
    let constructor_args = (deployment.account_implementation, initialize).abi_encode_params();

    let mut creation = Vec::with_capacity(proxy_creation_code.len() + constructor_args.len());
    creation.extend_from_slice(proxy_creation_code);
    creation.extend_from_slice(&constructor_args);

    let salt = B256::from(deployment.account_salt.to_be_bytes::<32>());
    Some(deployment.factory.create2(salt, keccak256(&creation)))
}
