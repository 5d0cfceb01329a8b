use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// ERC-4337 user operation (EntryPoint v0.6 layout).
///
/// Serialises the way bundlers and paymasters expect on the wire: camelCase keys, 0x-prefixed
/// quantities and byte strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// Sponsor response to `pm_sponsorUserOperation`.
///
/// Gas fields are optional: sponsors that do not re-estimate leave the operation's own limits
/// in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipTerms {
    pub paymaster_and_data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_verification_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_gas_limit: Option<U256>,
}

/// Bundler answer to `eth_getUserOperationReceipt` once the operation is in a block.
///
/// Only the fields the dispatcher reads are kept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: B256,
    /// Whether the account's call succeeded. The bundle itself landed either way.
    pub success: bool,
    pub receipt: IncludedTransaction,
}

/// The bundle transaction that carried a user operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedTransaction {
    pub transaction_hash: B256,
}

impl UserOperation {
    /// Fold sponsor terms into the operation. Only fields the sponsor returned are replaced.
    pub fn apply_sponsorship(&mut self, terms: SponsorshipTerms) {
        self.paymaster_and_data = terms.paymaster_and_data;
        if let Some(gas) = terms.pre_verification_gas {
            self.pre_verification_gas = gas;
        }
        if let Some(gas) = terms.verification_gas_limit {
            self.verification_gas_limit = gas;
        }
        if let Some(gas) = terms.call_gas_limit {
            self.call_gas_limit = gas;
        }
    }

    /// True once every gas limit the entry point checks is non-zero.
    pub fn has_gas_limits(&self) -> bool {
        !self.call_gas_limit.is_zero()
            && !self.verification_gas_limit.is_zero()
            && !self.pre_verification_gas.is_zero()
    }
}
