//! Command line and environment configuration.
//!
//! Every option can come from a flag or from the environment (a `.env` file is loaded first),
//! so a bare `gasless-dispatch token` works once `NODE_QUERY_URL` is set.

use std::{path::PathBuf, time::Duration};

use alloy_primitives::{
    utils::{parse_units, ParseUnits},
    Address, Bytes, U256,
};
use clap::{Args, Parser, Subcommand};
use gasless_intent_types::deployment::{
    BASE_SEPOLIA_CHAIN_ID, BASE_SEPOLIA_DAI, ENTRY_POINT_V06, SIMPLE_ACCOUNT_FACTORY,
    SIMPLE_ACCOUNT_IMPLEMENTATION,
};
use gasless_intent_types::{DeploymentConfig, TransactionIntent};

use crate::{errors::EncodingError, executor::EndpointUrls, orchestrator::RetryPolicy};

/// Bootstrap a smart-account identity and dispatch one sponsored intent.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Chain-query endpoint. Also used as bundler and paymaster unless overridden.
    #[arg(long, env = "NODE_QUERY_URL")]
    pub node_query_url: String,

    /// Bundler endpoint (defaults to `--node-query-url`).
    #[arg(long, env = "BUNDLER_URL")]
    pub bundler_url: Option<String>,

    /// Paymaster (sponsorship) endpoint (defaults to `--node-query-url`).
    #[arg(long, env = "PAYMASTER_URL")]
    pub paymaster_url: Option<String>,

    /// `production` logs JSON at info level; anything else logs text at debug level.
    #[arg(long, env = "NETWORK_ENV", default_value = "development")]
    pub network_env: String,

    /// Where the identity record lives, relative to the working directory.
    #[arg(long, env = "IDENTITY_PATH", default_value = ".cache.json")]
    pub identity_path: PathBuf,

    #[command(flatten)]
    pub deployment: DeploymentArgs,

    #[command(flatten)]
    pub dispatch: DispatchArgs,

    #[command(subcommand)]
    pub intent: IntentCommand,
}

impl Cli {
    pub fn endpoints(&self) -> EndpointUrls {
        EndpointUrls {
            query: self.node_query_url.clone(),
            bundler: self
                .bundler_url
                .clone()
                .unwrap_or_else(|| self.node_query_url.clone()),
            paymaster: self
                .paymaster_url
                .clone()
                .unwrap_or_else(|| self.node_query_url.clone()),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeploymentArgs {
    #[arg(long, env = "CHAIN_ID", default_value_t = BASE_SEPOLIA_CHAIN_ID)]
    pub chain_id: u64,

    #[arg(long, env = "ENTRY_POINT", default_value_t = ENTRY_POINT_V06)]
    pub entry_point: Address,

    #[arg(long, env = "ACCOUNT_FACTORY", default_value_t = SIMPLE_ACCOUNT_FACTORY)]
    pub factory: Address,

    #[arg(long, env = "ACCOUNT_IMPLEMENTATION", default_value_t = SIMPLE_ACCOUNT_IMPLEMENTATION)]
    pub account_implementation: Address,

    /// Hex creation code of the proxy the factory deploys. Without it the smart-account address
    /// is read from the factory's `getAddress`.
    #[arg(long, env = "ACCOUNT_PROXY_CREATION_CODE")]
    pub proxy_creation_code: Option<Bytes>,

    #[arg(long, env = "ACCOUNT_SALT", default_value_t = U256::ZERO)]
    pub account_salt: U256,

    /// Token for `token` intents when `--token` is not given.
    #[arg(long, env = "TOKEN_ADDRESS", default_value_t = BASE_SEPOLIA_DAI)]
    pub token_address: Address,

    #[arg(long, env = "TOKEN_DECIMALS", default_value_t = 18)]
    pub token_decimals: u8,
}

impl DeploymentArgs {
    pub fn into_config(self) -> DeploymentConfig {
        DeploymentConfig {
            chain_id: self.chain_id,
            entry_point: self.entry_point,
            factory: self.factory,
            account_implementation: self.account_implementation,
            proxy_creation_code: self.proxy_creation_code.filter(|code| !code.is_empty()),
            account_salt: self.account_salt,
            token: self.token_address,
            token_decimals: self.token_decimals,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DispatchArgs {
    /// Upper bound on each endpoint call.
    #[arg(long, env = "STAGE_TIMEOUT_SECS", default_value_t = 30)]
    pub stage_timeout_secs: u64,

    /// Attempts per intent; only unreachable endpoints and timeouts are retried.
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 1)]
    pub max_attempts: u32,

    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 500)]
    pub retry_backoff_ms: u64,

    /// Wait for the bundle carrying the operation (bounded by the stage timeout) and report its
    /// transaction hash.
    #[arg(long, env = "AWAIT_RECEIPT")]
    pub await_receipt: bool,

    #[arg(long, env = "RECEIPT_POLL_MS", default_value_t = 2_000)]
    pub receipt_poll_ms: u64,

    /// Transaction explorer base, eg `https://sepolia.basescan.org/tx`. Links need
    /// `--await-receipt`.
    #[arg(long, env = "EXPLORER_URL")]
    pub explorer_url: Option<String>,
}

impl DispatchArgs {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    /// Receipt polling interval, when receipts are awaited at all.
    pub fn receipt_poll(&self) -> Option<Duration> {
        self.await_receipt.then(|| Duration::from_millis(self.receipt_poll_ms))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum IntentCommand {
    /// Send native currency from the smart account.
    Native {
        /// Receiver (defaults to the owner address).
        #[arg(long)]
        to: Option<Address>,
        /// Amount in ether.
        #[arg(long, default_value = "0.0001")]
        amount: String,
    },
    /// Transfer an ERC-20 token held by the smart account.
    Token {
        #[arg(long)]
        to: Option<Address>,
        #[arg(long)]
        token: Option<Address>,
        /// Amount in whole tokens, scaled by `TOKEN_DECIMALS`.
        #[arg(long, default_value = "1")]
        amount: String,
    },
    /// Mint an NFT to the receiver.
    Nft {
        #[arg(long)]
        to: Option<Address>,
        #[arg(long, env = "NFT_CONTRACT_ADDRESS")]
        contract: Address,
    },
}

impl IntentCommand {
    pub fn into_intent(
        self,
        owner: Address,
        deployment: &DeploymentConfig,
    ) -> Result<TransactionIntent, EncodingError> {
        Ok(match self {
            IntentCommand::Native { to, amount } => TransactionIntent::NativeTransfer {
                receiver: to.unwrap_or(owner),
                amount: parse_amount(&amount, 18)?,
            },
            IntentCommand::Token { to, token, amount } => TransactionIntent::TokenTransfer {
                token: token.unwrap_or(deployment.token),
                receiver: to.unwrap_or(owner),
                amount: parse_amount(&amount, deployment.token_decimals)?,
            },
            IntentCommand::Nft { to, contract } => TransactionIntent::NftMint {
                contract,
                receiver: to.unwrap_or(owner),
            },
        })
    }
}

/// Decimal string to smallest units, eg `"1.5"` with 6 decimals is `1_500_000`.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, EncodingError> {
    let invalid = |reason: String| EncodingError::InvalidAmount {
        amount: amount.to_string(),
        reason,
    };
    match parse_units(amount.trim(), decimals).map_err(|e| invalid(e.to_string()))? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => Err(invalid("amount must not be negative".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec![
            "gasless-dispatch",
            "--node-query-url",
            "https://api.developer.coinbase.com/rpc/v1/base-sepolia/key",
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_endpoints_default_to_node_query_url() {
        let cli = parse(&["native"]);
        let urls = cli.endpoints();
        assert_eq!(urls.bundler, cli.node_query_url);
        assert_eq!(urls.paymaster, cli.node_query_url);

        let cli = parse(&["--paymaster-url", "http://sponsor.local", "native"]);
        assert_eq!(cli.endpoints().paymaster, "http://sponsor.local");
        assert_eq!(cli.endpoints().bundler, cli.node_query_url);
    }

    #[test]
    fn test_node_url_alone_selects_base_sepolia() {
        let cfg = parse(&["native"]).deployment.into_config();
        assert_eq!(cfg, DeploymentConfig::base_sepolia());
        assert_eq!(cfg.entry_point, ENTRY_POINT_V06);
        assert_eq!(cfg.factory, SIMPLE_ACCOUNT_FACTORY);
        assert_eq!(cfg.chain_id, BASE_SEPOLIA_CHAIN_ID);
        assert_eq!(cfg.account_salt, U256::ZERO);
        assert_eq!(cfg.token, BASE_SEPOLIA_DAI);
        assert_eq!(cfg.proxy_creation_code, None);
    }

    #[test]
    fn test_creation_code_enables_local_derivation() {
        let cfg = parse(&["--proxy-creation-code", "0x6080604052", "native"])
            .deployment
            .into_config();
        assert_eq!(
            cfg.proxy_creation_code,
            Some(Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]))
        );

        let empty = parse(&["--proxy-creation-code", "0x", "native"]).deployment.into_config();
        assert_eq!(empty.proxy_creation_code, None);
    }

    #[test]
    fn test_receipt_polling_is_opt_in() {
        assert_eq!(parse(&["native"]).dispatch.receipt_poll(), None);

        let cli = parse(&["--await-receipt", "--receipt-poll-ms", "250", "native"]);
        assert_eq!(cli.dispatch.receipt_poll(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_intents_default_receiver_to_owner() {
        let cfg = parse(&["native"]).deployment.into_config();

        let native = parse(&["native"]).intent.into_intent(owner(), &cfg).unwrap();
        assert_eq!(
            native,
            TransactionIntent::NativeTransfer {
                receiver: owner(),
                amount: U256::from(100_000_000_000_000u64),
            }
        );

        let token = parse(&["token"]).intent.into_intent(owner(), &cfg).unwrap();
        assert_eq!(
            token,
            TransactionIntent::TokenTransfer {
                token: BASE_SEPOLIA_DAI,
                receiver: owner(),
                amount: U256::from(10u64).pow(U256::from(18u64)),
            }
        );
    }

    #[test]
    fn test_nft_intent_uses_supplied_contract() {
        let contract = "0x4242424242424242424242424242424242424242";
        let receiver = "0x1111111111111111111111111111111111111111";
        let cli = parse(&["nft", "--contract", contract, "--to", receiver]);
        let cfg = cli.deployment.clone().into_config();

        assert_eq!(
            cli.intent.into_intent(owner(), &cfg).unwrap(),
            TransactionIntent::NftMint {
                contract: Address::repeat_byte(0x42),
                receiver: Address::repeat_byte(0x11),
            }
        );
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_amount("0", 18).unwrap(), U256::ZERO);
        assert!(matches!(
            parse_amount("-1", 18),
            Err(EncodingError::InvalidAmount { .. })
        ));
        assert!(parse_amount("one", 18).is_err());
    }

    #[test]
    fn test_retry_policy_from_args() {
        let cli = parse(&["--max-attempts", "3", "--retry-backoff-ms", "10", "native"]);
        assert_eq!(
            cli.dispatch.retry_policy(),
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(10),
            }
        );
        assert_eq!(cli.dispatch.stage_timeout(), Duration::from_secs(30));
    }
}
