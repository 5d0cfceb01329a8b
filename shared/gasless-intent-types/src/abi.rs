//! Solidity ABI surface touched by the dispatcher.
//!
//! Account and entry point interfaces follow the EntryPoint v0.6 / `SimpleAccount` reference
//! contracts.

use alloy_sol_types::sol;

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
    }

    interface INftMinter {
        function mint(address to) external;
    }

    interface ISimpleAccount {
        function execute(address dest, uint256 value, bytes func) external;
        function executeBatch(address[] dest, bytes[] func) external;
        function initialize(address anOwner) external;
    }

    interface ISimpleAccountFactory {
        function createAccount(address owner, uint256 salt) external returns (address ret);
        function getAddress(address owner, uint256 salt) external view returns (address ret);
    }

    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}
