use alloy_primitives::{address, Address, Bytes, U256};

/// Base Sepolia chain id.
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84_532;

/// ERC-4337 EntryPoint v0.6.
pub const ENTRY_POINT_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// `SimpleAccountFactory` used for owner-keyed smart accounts.
pub const SIMPLE_ACCOUNT_FACTORY: Address = address!("9406Cc6185a346906296840746125a0E44976454");

/// `SimpleAccount` implementation the factory proxies to.
pub const SIMPLE_ACCOUNT_IMPLEMENTATION: Address =
    address!("8ABB13360b87Be5EEb1B98647A016adD927a136c");

/// DAI on Base Sepolia.
pub const BASE_SEPOLIA_DAI: Address = address!("7683022d84F726a96c4A6611cD31DBf5409c0Ac9");

/// Network-wide parameters that fix how smart accounts are derived and addressed.
///
/// The factory, implementation and salt together determine the counterfactual account address,
/// so two runs with the same key and the same `DeploymentConfig` always agree on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub chain_id: u64,
    pub entry_point: Address,
    pub factory: Address,
    pub account_implementation: Address,
    /// Creation code of the proxy the factory deploys (`ERC1967Proxy` for `SimpleAccountFactory`).
    ///
    /// With it the account address is derived locally; without it the factory's `getAddress`
    /// view is asked instead.
    pub proxy_creation_code: Option<Bytes>,
    /// Salt passed to `createAccount`; index 0 is the owner's first account.
    pub account_salt: U256,
    /// Token used by `TokenTransfer` when the caller does not name one.
    pub token: Address,
    pub token_decimals: u8,
}

impl DeploymentConfig {
    /// Base Sepolia defaults. Account addresses come from the factory until a proxy creation
    /// code is supplied.
    pub fn base_sepolia() -> Self {
        Self {
            chain_id: BASE_SEPOLIA_CHAIN_ID,
            entry_point: ENTRY_POINT_V06,
            factory: SIMPLE_ACCOUNT_FACTORY,
            account_implementation: SIMPLE_ACCOUNT_IMPLEMENTATION,
            proxy_creation_code: None,
            account_salt: U256::ZERO,
            token: BASE_SEPOLIA_DAI,
            token_decimals: 18,
        }
    }

    /// Derive account addresses locally from `code`. An empty code is ignored.
    pub fn with_proxy_creation_code(mut self, code: Bytes) -> Self {
        self.proxy_creation_code = Some(code).filter(|code| !code.is_empty());
        self
    }
}
