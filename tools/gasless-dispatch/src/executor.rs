//! Sponsored ERC-4337 execution.
//!
//! One `submit` runs a fixed pipeline against three JSON-RPC endpoints:
//! 1. query endpoint: deployment state, account nonce and fee levels for the unsigned operation;
//! 2. paymaster endpoint: `pm_sponsorUserOperation`, which may rewrite gas fields;
//! 3. local: sign the sponsor-adjusted operation with the owner key;
//! 4. bundler endpoint: `eth_sendUserOperation`, whose result is the submission reference;
//! 5. optionally, bundler endpoint: `eth_getUserOperationReceipt` until the bundle lands.
//!
//! Every call is single-shot and bounded by `stage_timeout`. The only state carried between
//! submits is the caller's [`AccountSequence`].

use core::fmt;
use std::time::Duration;

use alloy_primitives::{aliases::U192, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Provider, ProviderError, RpcError};
use gasless_intent_encoder::{
    derive_smart_account, dummy_signature, init_code, sign_user_operation, wrap_execute,
};
use gasless_intent_types::abi::{IEntryPoint, ISimpleAccountFactory};
use gasless_intent_types::{
    CallPayload, DeploymentConfig, ExecutionOutcome, SponsorshipTerms, UserOperation,
    UserOperationReceipt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::{
    errors::{DispatchError, PersistenceError},
    identity_store::{AccountResolver, Identity},
    queue::AccountSequence,
};

/// JSON-RPC "invalid params".
const INVALID_PARAMS: i64 = -32602;
/// ERC-4337 bundler code for a paymaster that rejected the operation during validation.
const PAYMASTER_REJECTED: i64 = -32501;

/// Which endpoint a network call went to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Query,
    Sponsorship,
    Bundling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Query => "query",
            Stage::Sponsorship => "sponsorship",
            Stage::Bundling => "bundler",
        })
    }
}

/// The single capability the orchestrator needs from an execution layer.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Submit as the next operation of the account's lane. Always returns an outcome; failures
    /// are classified, never raised.
    async fn submit_in_sequence(
        &self,
        identity: &Identity,
        payload: CallPayload,
        sequence: &mut AccountSequence,
    ) -> ExecutionOutcome;

    /// Submit with no earlier operations from this process.
    async fn submit(&self, identity: &Identity, payload: CallPayload) -> ExecutionOutcome {
        let mut sequence = AccountSequence::default();
        self.submit_in_sequence(identity, payload, &mut sequence).await
    }
}

#[derive(Clone, Debug)]
pub struct EndpointUrls {
    pub query: String,
    pub bundler: String,
    pub paymaster: String,
}

#[derive(Serialize, Debug)]
struct CallRequest {
    to: Address,
    data: Bytes,
}

/// What the bundler accepted, plus the bundle transaction when receipts were awaited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub reference: String,
    pub transaction_hash: Option<B256>,
}

pub struct SponsoredExecutor<P> {
    query: Provider<P>,
    bundler: Provider<P>,
    paymaster: Provider<P>,
    deployment: DeploymentConfig,
    stage_timeout: Duration,
    receipt_poll: Option<Duration>,
}

impl SponsoredExecutor<Http> {
    pub fn connect(
        urls: &EndpointUrls,
        deployment: DeploymentConfig,
        stage_timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let open = |stage: Stage, url: &str| {
            Provider::<Http>::try_from(url).map_err(|e| {
                DispatchError::NetworkUnreachable(format!("invalid {stage} endpoint {url:?}: {e}"))
            })
        };
        Ok(Self::new(
            open(Stage::Query, &urls.query)?,
            open(Stage::Bundling, &urls.bundler)?,
            open(Stage::Sponsorship, &urls.paymaster)?,
            deployment,
            stage_timeout,
        ))
    }
}

impl<P: JsonRpcClient> SponsoredExecutor<P> {
    pub fn new(
        query: Provider<P>,
        bundler: Provider<P>,
        paymaster: Provider<P>,
        deployment: DeploymentConfig,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            query,
            bundler,
            paymaster,
            deployment,
            stage_timeout,
            receipt_poll: None,
        }
    }

    /// After submission, poll the bundler every `interval` for the operation's receipt, for at
    /// most one stage timeout.
    pub fn with_receipt_polling(mut self, interval: Duration) -> Self {
        self.receipt_poll = Some(interval);
        self
    }

    /// Run the whole pipeline once as the next operation of `sequence`.
    pub async fn try_submit(
        &self,
        identity: &Identity,
        payload: &CallPayload,
        sequence: &mut AccountSequence,
    ) -> Result<Submission, DispatchError> {
        let mut op = self.build_operation(identity, payload, sequence).await?;
        debug!(
            sender = %op.sender,
            nonce = %op.nonce,
            deploys = !op.init_code.is_empty(),
            "built user operation"
        );

        self.sponsor(&mut op).await?;
        debug!(
            call_gas = %op.call_gas_limit,
            verification_gas = %op.verification_gas_limit,
            pre_verification_gas = %op.pre_verification_gas,
            "operation sponsored"
        );

        let hash = sign_user_operation(
            &mut op,
            &identity.signing_key,
            self.deployment.entry_point,
            self.deployment.chain_id,
        )
        .map_err(|e| DispatchError::MalformedOperation(format!("signing failed: {e}")))?;
        debug!(user_op_hash = %hash, "operation signed");

        let reference = self.send(&op).await?;
        sequence.issued(op.nonce);

        let transaction_hash = match self.receipt_poll {
            Some(interval) => self.included_in(&reference, interval).await,
            None => None,
        };
        Ok(Submission {
            reference,
            transaction_hash,
        })
    }

    /// Unsigned operation for `payload`, carrying the placeholder signature and zero gas limits
    /// for the sponsor to fill in.
    ///
    /// The nonce continues from `sequence`, and `initCode` is only attached while no earlier
    /// operation of the lane is already deploying the account.
    pub async fn build_operation(
        &self,
        identity: &Identity,
        payload: &CallPayload,
        sequence: &AccountSequence,
    ) -> Result<UserOperation, DispatchError> {
        let sender = identity.smart_account;

        let code: Bytes = self.call(Stage::Query, "eth_getCode", (sender, "latest")).await?;
        let init_code = if code.is_empty() && !sequence.deployment_pending() {
            init_code(identity.owner, &self.deployment)
        } else {
            Bytes::new()
        };

        let on_chain = self
            .view(
                self.deployment.entry_point,
                IEntryPoint::getNonceCall {
                    sender,
                    key: U192::ZERO,
                },
            )
            .await?
            .nonce;
        let nonce = sequence.next_nonce(on_chain);

        let max_fee_per_gas: U256 = self.call(Stage::Query, "eth_gasPrice", ()).await?;
        let max_priority_fee_per_gas: U256 =
            self.call(Stage::Query, "eth_maxPriorityFeePerGas", ()).await?;

        Ok(UserOperation {
            sender,
            nonce,
            init_code,
            call_data: wrap_execute(payload),
            max_fee_per_gas,
            max_priority_fee_per_gas: max_priority_fee_per_gas.min(max_fee_per_gas),
            signature: dummy_signature(),
            ..Default::default()
        })
    }

    /// `SimpleAccountFactory.getAddress(owner, salt)`.
    pub async fn factory_address(&self, owner: Address) -> Result<Address, DispatchError> {
        let call = ISimpleAccountFactory::getAddressCall {
            owner,
            salt: self.deployment.account_salt,
        };
        Ok(self.view(self.deployment.factory, call).await?.ret)
    }

    /// Ask the paymaster to cover `op` and fold its terms in.
    pub async fn sponsor(&self, op: &mut UserOperation) -> Result<(), DispatchError> {
        let terms: SponsorshipTerms = self
            .call(
                Stage::Sponsorship,
                "pm_sponsorUserOperation",
                (&*op, self.deployment.entry_point),
            )
            .await?;

        if terms.paymaster_and_data.is_empty() {
            return Err(DispatchError::SponsorshipDenied(
                "sponsor returned empty paymasterAndData".to_string(),
            ));
        }
        op.apply_sponsorship(terms);
        if !op.has_gas_limits() {
            return Err(DispatchError::InsufficientData(
                "gas limits still unset after sponsorship".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn send(&self, op: &UserOperation) -> Result<String, DispatchError> {
        let reference: String = self
            .call(
                Stage::Bundling,
                "eth_sendUserOperation",
                (op, self.deployment.entry_point),
            )
            .await?;
        if reference.trim().is_empty() {
            return Err(DispatchError::InsufficientData(
                "bundler returned an empty reference".to_string(),
            ));
        }
        Ok(reference)
    }

    /// Poll `eth_getUserOperationReceipt` until the operation is in a block or one stage timeout
    /// has passed. `Ok(None)` when it did not land in time.
    pub async fn await_receipt(
        &self,
        reference: &str,
        interval: Duration,
    ) -> Result<Option<UserOperationReceipt>, DispatchError> {
        let poll = async {
            loop {
                let receipt: Option<UserOperationReceipt> = self
                    .call(Stage::Bundling, "eth_getUserOperationReceipt", [reference])
                    .await?;
                match receipt {
                    Some(receipt) => break Ok::<_, DispatchError>(receipt),
                    None => tokio::time::sleep(interval).await,
                }
            }
        };
        match tokio::time::timeout(self.stage_timeout, poll).await {
            Ok(receipt) => receipt.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Bundle transaction for an accepted operation. The operation stays submitted whatever
    /// happens here.
    async fn included_in(&self, reference: &str, interval: Duration) -> Option<B256> {
        match self.await_receipt(reference, interval).await {
            Ok(Some(receipt)) => {
                if !receipt.success {
                    warn!(%reference, "user operation reverted inside its bundle");
                }
                debug!(%reference, tx = %receipt.receipt.transaction_hash, "operation included");
                Some(receipt.receipt.transaction_hash)
            }
            Ok(None) => {
                warn!(%reference, secs = self.stage_timeout.as_secs(), "no receipt in time");
                None
            }
            Err(err) => {
                warn!(%reference, error = %err, "receipt lookup failed");
                None
            }
        }
    }

    /// `eth_call` of a view function on the query endpoint.
    async fn view<C: SolCall + Send + Sync>(
        &self,
        to: Address,
        call: C,
    ) -> Result<C::Return, DispatchError> {
        let request = CallRequest {
            to,
            data: call.abi_encode().into(),
        };
        let raw: Bytes = self.call(Stage::Query, "eth_call", (request, "latest")).await?;
        C::abi_decode_returns(&raw, true).map_err(|e| {
            DispatchError::InsufficientData(format!("{} returned {raw}: {e}", C::SIGNATURE))
        })
    }

    async fn call<T, R>(&self, stage: Stage, method: &str, params: T) -> Result<R, DispatchError>
    where
        T: fmt::Debug + Serialize + Send + Sync,
        R: Serialize + DeserializeOwned + fmt::Debug + Send,
    {
        let provider = match stage {
            Stage::Query => &self.query,
            Stage::Sponsorship => &self.paymaster,
            Stage::Bundling => &self.bundler,
        };
        debug!(%stage, method, "rpc request");

        match tokio::time::timeout(self.stage_timeout, provider.request(method, params)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(classify(stage, method, &err)),
            Err(_) => Err(DispatchError::Timeout {
                stage,
                secs: self.stage_timeout.as_secs(),
            }),
        }
    }
}

/// Map a transport or JSON-RPC failure onto the dispatch error classes.
fn classify(stage: Stage, method: &str, err: &ProviderError) -> DispatchError {
    if let Some(rpc) = err.as_error_response() {
        let cause = format!("{} (code {})", rpc.message, rpc.code);
        return match stage {
            Stage::Sponsorship => DispatchError::SponsorshipDenied(cause),
            Stage::Bundling if rpc.code == INVALID_PARAMS => {
                DispatchError::MalformedOperation(cause)
            }
            Stage::Bundling if rpc.code == PAYMASTER_REJECTED => {
                DispatchError::SponsorshipDenied(cause)
            }
            Stage::Bundling => DispatchError::SubmissionError(cause),
            Stage::Query => DispatchError::InsufficientData(format!("{method}: {cause}")),
        };
    }
    if let Some(e) = err.as_serde_error() {
        return DispatchError::InsufficientData(format!(
            "unexpected {method} response from {stage} endpoint: {e}"
        ));
    }
    DispatchError::NetworkUnreachable(format!("{stage} endpoint ({method}): {err}"))
}

#[async_trait]
impl<P: JsonRpcClient + 'static> Dispatch for SponsoredExecutor<P> {
    async fn submit_in_sequence(
        &self,
        identity: &Identity,
        payload: CallPayload,
        sequence: &mut AccountSequence,
    ) -> ExecutionOutcome {
        match self.try_submit(identity, &payload, sequence).await {
            Ok(Submission {
                reference,
                transaction_hash,
            }) => {
                info!(
                    smart_account = %identity.smart_account,
                    %reference,
                    "user operation submitted"
                );
                ExecutionOutcome::Submitted {
                    reference,
                    transaction_hash,
                }
            }
            Err(err) => {
                warn!(
                    smart_account = %identity.smart_account,
                    error = %err,
                    "user operation failed"
                );
                ExecutionOutcome::Failed {
                    kind: err.kind(),
                    reason: err.to_string(),
                }
            }
        }
    }
}

/// Local CREATE2 derivation when the proxy creation code is configured, otherwise the factory's
/// own `getAddress` on the query endpoint.
#[async_trait]
impl<P: JsonRpcClient + 'static> AccountResolver for SponsoredExecutor<P> {
    async fn smart_account(&self, owner: Address) -> Result<Address, PersistenceError> {
        if let Some(address) = derive_smart_account(owner, &self.deployment) {
            return Ok(address);
        }
        self.factory_address(owner)
            .await
            .map_err(|e| PersistenceError::Underivable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Orchestrator;
    use alloy_primitives::{address, b256};
    use ethers::providers::{JsonRpcError, MockError, MockProvider, MockResponse};
    use gasless_intent_encoder::{encode, owner_address};
    use gasless_intent_types::{FailureKind, TransactionIntent};
    use k256::ecdsa::SigningKey;
    use serde_json::{json, Value};

    const DAI: Address = address!("7683022d84F726a96c4A6611cD31DBf5409c0Ac9");
    const RECEIVER: Address = address!("abcdabcdabcdabcdabcdabcdabcdabcdabcdabcd");
    const REFERENCE: &str = "0x7859000ebc3220b620934135795a76336813ca4bfe9eb67c8eda2d1bf9304d54";
    const NEXT_REFERENCE: &str =
        "0x9d1c4f0b6f1c7e6a2b8e3f1d0c5a4b3e2f1a0b9c8d7e6f5a4b3c2d1e0f9a8b7c";

    fn deployment() -> DeploymentConfig {
        DeploymentConfig::base_sepolia()
            .with_proxy_creation_code(Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]))
    }

    fn identity() -> Identity {
        let mut bytes = [0u8; 32];
        bytes[31] = 7;
        let signing_key = SigningKey::from_slice(&bytes).unwrap();
        let owner = owner_address(&signing_key);
        Identity {
            smart_account: derive_smart_account(owner, &deployment()).unwrap(),
            signing_key,
            owner,
        }
    }

    fn dai_payload() -> CallPayload {
        encode(&TransactionIntent::TokenTransfer {
            token: DAI,
            receiver: RECEIVER,
            amount: U256::from(10u64).pow(U256::from(18u64)),
        })
    }

    fn ok(value: impl Serialize) -> MockResponse {
        MockResponse::Value(serde_json::to_value(value).unwrap())
    }

    fn rpc_error(code: i64, message: &str) -> MockResponse {
        MockResponse::Error(JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        })
    }

    /// Mock endpoint answering in the given order.
    fn scripted(responses: Vec<MockResponse>) -> (Provider<MockProvider>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        // MockProvider pops the most recently pushed response first.
        for response in responses.into_iter().rev() {
            mock.push_response(response);
        }
        (provider, mock)
    }

    const GAS_PRICE: u64 = 1_000_000_000;
    const PRIORITY_FEE: u64 = 100_000_000;

    fn query_responses(code: &str, nonce: u64) -> Vec<MockResponse> {
        vec![
            ok(code),
            ok(Bytes::from(U256::from(nonce).to_be_bytes::<32>().to_vec())),
            ok(U256::from(GAS_PRICE)),
            ok(U256::from(PRIORITY_FEE)),
        ]
    }

    fn sponsor_terms() -> SponsorshipTerms {
        SponsorshipTerms {
            paymaster_and_data: Bytes::from(vec![0x22; 20]),
            pre_verification_gas: Some(U256::from(48_000u64)),
            verification_gas_limit: Some(U256::from(320_000u64)),
            call_gas_limit: Some(U256::from(90_000u64)),
        }
    }

    fn expected_unsigned(
        identity: &Identity,
        payload: &CallPayload,
        deploys: bool,
        nonce: u64,
    ) -> UserOperation {
        UserOperation {
            sender: identity.smart_account,
            nonce: U256::from(nonce),
            init_code: if deploys {
                init_code(identity.owner, &deployment())
            } else {
                Bytes::new()
            },
            call_data: wrap_execute(payload),
            max_fee_per_gas: U256::from(GAS_PRICE),
            max_priority_fee_per_gas: U256::from(PRIORITY_FEE),
            signature: dummy_signature(),
            ..Default::default()
        }
    }

    /// What the bundler receives for `op` once the sponsor terms are in and the owner signed.
    fn sponsored_and_signed(identity: &Identity, mut op: UserOperation) -> UserOperation {
        let cfg = deployment();
        op.apply_sponsorship(sponsor_terms());
        sign_user_operation(&mut op, &identity.signing_key, cfg.entry_point, cfg.chain_id)
            .unwrap();
        op
    }

    struct Harness {
        executor: SponsoredExecutor<MockProvider>,
        query: MockProvider,
        bundler: MockProvider,
        paymaster: MockProvider,
    }

    fn harness(
        query: Vec<MockResponse>,
        paymaster: Vec<MockResponse>,
        bundler: Vec<MockResponse>,
    ) -> Harness {
        let (query_provider, query) = scripted(query);
        let (paymaster_provider, paymaster) = scripted(paymaster);
        let (bundler_provider, bundler) = scripted(bundler);
        Harness {
            executor: SponsoredExecutor::new(
                query_provider,
                bundler_provider,
                paymaster_provider,
                deployment(),
                Duration::from_secs(5),
            ),
            query,
            bundler,
            paymaster,
        }
    }

    #[tokio::test]
    async fn test_sponsored_submission_returns_bundler_reference() {
        let identity = identity();
        let payload = dai_payload();
        let h = harness(
            query_responses("0x", 0),
            vec![ok(sponsor_terms())],
            vec![ok(REFERENCE)],
        );

        let outcome = h.executor.submit(&identity, payload.clone()).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Submitted {
                reference: REFERENCE.to_string(),
                transaction_hash: None,
            }
        );

        let cfg = deployment();
        h.query
            .assert_request("eth_getCode", (identity.smart_account, "latest"))
            .unwrap();

        let expected = expected_unsigned(&identity, &payload, true, 0);
        h.paymaster
            .assert_request("pm_sponsorUserOperation", (&expected, cfg.entry_point))
            .unwrap();

        // what reaches the bundler is the sponsor-adjusted operation, signed by the owner
        let signed = sponsored_and_signed(&identity, expected);
        h.bundler
            .assert_request("eth_sendUserOperation", (&signed, cfg.entry_point))
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_intents_get_consecutive_nonces() {
        let identity = identity();
        let intents = [
            TransactionIntent::TokenTransfer {
                token: DAI,
                receiver: RECEIVER,
                amount: U256::from(10u64).pow(U256::from(18u64)),
            },
            TransactionIntent::NftMint {
                contract: Address::repeat_byte(0x42),
                receiver: RECEIVER,
            },
        ];
        // the chain never mines: the account stays undeployed at nonce 0 for both builds
        let mut query = query_responses("0x", 0);
        query.extend(query_responses("0x", 0));
        let h = harness(
            query,
            vec![ok(sponsor_terms()), ok(sponsor_terms())],
            vec![ok(REFERENCE), ok(NEXT_REFERENCE)],
        );
        let (paymaster, bundler) = (h.paymaster, h.bundler);
        let orchestrator = Orchestrator::new(h.executor);

        let outcomes = orchestrator.dispatch_all(&identity, &intents).await;
        assert!(outcomes.iter().all(ExecutionOutcome::is_submitted), "{outcomes:?}");

        let cfg = deployment();
        let first = expected_unsigned(&identity, &encode(&intents[0]), true, 0);
        let second = expected_unsigned(&identity, &encode(&intents[1]), false, 1);
        paymaster
            .assert_request("pm_sponsorUserOperation", (&first, cfg.entry_point))
            .unwrap();
        paymaster
            .assert_request("pm_sponsorUserOperation", (&second, cfg.entry_point))
            .unwrap();
        bundler
            .assert_request(
                "eth_sendUserOperation",
                (&sponsored_and_signed(&identity, first), cfg.entry_point),
            )
            .unwrap();
        bundler
            .assert_request(
                "eth_sendUserOperation",
                (&sponsored_and_signed(&identity, second), cfg.entry_point),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_send_does_not_consume_nonce() {
        let identity = identity();
        let payload = dai_payload();
        let mut query = query_responses("0x", 0);
        query.extend(query_responses("0x", 0));
        let h = harness(
            query,
            vec![ok(sponsor_terms()), ok(sponsor_terms())],
            vec![rpc_error(-32500, "AA21 didn't pay prefund"), ok(REFERENCE)],
        );
        let mut sequence = AccountSequence::default();

        let rejected = h
            .executor
            .submit_in_sequence(&identity, payload.clone(), &mut sequence)
            .await;
        assert!(!rejected.is_submitted());
        assert_eq!(sequence, AccountSequence::default());

        let accepted = h
            .executor
            .submit_in_sequence(&identity, payload.clone(), &mut sequence)
            .await;
        assert!(accepted.is_submitted());
        assert_eq!(sequence.next_nonce(U256::ZERO), U256::from(1u64));

        let cfg = deployment();
        let expected = expected_unsigned(&identity, &payload, true, 0);
        for _ in 0..2 {
            h.paymaster
                .assert_request("pm_sponsorUserOperation", (&expected, cfg.entry_point))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_receipt_polling_reports_bundle_transaction() {
        let identity = identity();
        let payload = dai_payload();
        let tx = b256!("4f1c0e5a9d3b2c7e8f6a1b0c9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e");
        let receipt = json!({
            "userOpHash": REFERENCE,
            "success": true,
            "receipt": { "transactionHash": tx },
        });
        let h = harness(
            query_responses("0x", 0),
            vec![ok(sponsor_terms())],
            vec![ok(REFERENCE), ok(Value::Null), ok(receipt)],
        );
        let bundler = h.bundler;
        let executor = h.executor.with_receipt_polling(Duration::from_millis(1));

        let outcome = executor.submit(&identity, payload.clone()).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Submitted {
                reference: REFERENCE.to_string(),
                transaction_hash: Some(tx),
            }
        );

        let cfg = deployment();
        let expected = expected_unsigned(&identity, &payload, true, 0);
        let signed = sponsored_and_signed(&identity, expected);
        bundler
            .assert_request("eth_sendUserOperation", (&signed, cfg.entry_point))
            .unwrap();
        for _ in 0..2 {
            bundler
                .assert_request("eth_getUserOperationReceipt", [REFERENCE])
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_receipt_lookup_failure_keeps_submission() {
        // the bundler accepts the operation and then has nothing more to say
        let h = harness(
            query_responses("0x", 0),
            vec![ok(sponsor_terms())],
            vec![ok(REFERENCE)],
        );
        let executor = h.executor.with_receipt_polling(Duration::from_millis(1));

        assert_eq!(
            executor.submit(&identity(), dai_payload()).await,
            ExecutionOutcome::Submitted {
                reference: REFERENCE.to_string(),
                transaction_hash: None,
            }
        );
    }

    #[tokio::test]
    async fn test_factory_resolves_account_without_creation_code() {
        let owner = Address::repeat_byte(0x0a);
        let account = Address::repeat_byte(0x5c);
        let (query_provider, query) =
            scripted(vec![ok(Bytes::from(account.into_word().to_vec()))]);
        let (bundler, _) = scripted(vec![]);
        let (paymaster, _) = scripted(vec![]);
        let cfg = DeploymentConfig::base_sepolia();
        let executor = SponsoredExecutor::new(
            query_provider,
            bundler,
            paymaster,
            cfg.clone(),
            Duration::from_secs(5),
        );

        assert_eq!(executor.smart_account(owner).await.unwrap(), account);

        let request = CallRequest {
            to: cfg.factory,
            data: ISimpleAccountFactory::getAddressCall {
                owner,
                salt: U256::ZERO,
            }
            .abi_encode()
            .into(),
        };
        query.assert_request("eth_call", (request, "latest")).unwrap();
    }

    #[tokio::test]
    async fn test_configured_creation_code_resolves_offline() {
        let h = harness(vec![], vec![], vec![]);
        let identity = identity();

        assert_eq!(
            h.executor.smart_account(identity.owner).await.unwrap(),
            identity.smart_account
        );
        assert!(matches!(
            h.query.assert_request("eth_call", Value::Null),
            Err(MockError::EmptyRequests)
        ));
    }

    #[tokio::test]
    async fn test_deployed_account_skips_init_code() {
        let identity = identity();
        let payload = dai_payload();
        let h = harness(
            query_responses("0x6080604052", 5),
            vec![ok(sponsor_terms())],
            vec![ok(REFERENCE)],
        );

        assert!(h.executor.submit(&identity, payload.clone()).await.is_submitted());

        let expected = expected_unsigned(&identity, &payload, false, 5);
        h.paymaster
            .assert_request(
                "pm_sponsorUserOperation",
                (&expected, deployment().entry_point),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_sponsor_fails_without_retry() {
        let identity = identity();
        let payload = dai_payload();
        // the paymaster has nothing to answer with, which the mock reports as a transport error
        let h = harness(query_responses("0x", 0), vec![], vec![ok(REFERENCE)]);

        let outcome = h.executor.submit(&identity, payload.clone()).await;
        match &outcome {
            ExecutionOutcome::Failed { kind, reason } => {
                assert_eq!(*kind, FailureKind::NetworkUnreachable);
                assert!(reason.starts_with("network unreachable"), "{reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let expected = expected_unsigned(&identity, &payload, true, 0);
        h.paymaster
            .assert_request(
                "pm_sponsorUserOperation",
                (&expected, deployment().entry_point),
            )
            .unwrap();
        assert!(matches!(
            h.paymaster.assert_request("pm_sponsorUserOperation", Value::Null),
            Err(MockError::EmptyRequests)
        ));
        assert!(matches!(
            h.bundler.assert_request("eth_sendUserOperation", Value::Null),
            Err(MockError::EmptyRequests)
        ));
    }

    #[tokio::test]
    async fn test_sponsor_rejection_is_sponsorship_denied() {
        let h = harness(
            query_responses("0x", 0),
            vec![rpc_error(-32000, "policy limit reached")],
            vec![],
        );

        let outcome = h.executor.submit(&identity(), dai_payload()).await;
        match outcome {
            ExecutionOutcome::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::SponsorshipDenied);
                assert!(reason.contains("policy limit reached"), "{reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_sponsorship_is_denied() {
        let h = harness(
            query_responses("0x", 0),
            vec![ok(json!({ "paymasterAndData": "0x" }))],
            vec![],
        );

        let outcome = h.executor.submit(&identity(), dai_payload()).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed {
                kind: FailureKind::SponsorshipDenied,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_gas_limits_is_insufficient_data() {
        let h = harness(
            query_responses("0x", 0),
            vec![ok(json!({ "paymasterAndData": "0x2222" }))],
            vec![],
        );

        let outcome = h.executor.submit(&identity(), dai_payload()).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed {
                kind: FailureKind::InsufficientData,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bundler_rejections_are_classified() {
        for (code, kind) in [
            (-32500, FailureKind::Submission),
            (INVALID_PARAMS, FailureKind::MalformedOperation),
            (PAYMASTER_REJECTED, FailureKind::SponsorshipDenied),
        ] {
            let h = harness(
                query_responses("0x", 0),
                vec![ok(sponsor_terms())],
                vec![rpc_error(code, "rejected")],
            );
            match h.executor.submit(&identity(), dai_payload()).await {
                ExecutionOutcome::Failed { kind: got, reason } => {
                    assert_eq!(got, kind, "code {code}");
                    assert!(!reason.is_empty());
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_query_failure_stops_before_sponsorship() {
        let h = harness(
            vec![rpc_error(-32000, "header not found")],
            vec![ok(sponsor_terms())],
            vec![ok(REFERENCE)],
        );

        let outcome = h.executor.submit(&identity(), dai_payload()).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed {
                kind: FailureKind::InsufficientData,
                ..
            }
        ));
        assert!(matches!(
            h.paymaster.assert_request("pm_sponsorUserOperation", Value::Null),
            Err(MockError::EmptyRequests)
        ));
    }

    #[derive(Debug)]
    struct Stalled;

    #[async_trait]
    impl JsonRpcClient for Stalled {
        type Error = MockError;

        async fn request<T, R>(&self, _method: &str, _params: T) -> Result<R, Self::Error>
        where
            T: fmt::Debug + Serialize + Send + Sync,
            R: DeserializeOwned + Send,
        {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_endpoint_times_out() {
        let executor = SponsoredExecutor::new(
            Provider::new(Stalled),
            Provider::new(Stalled),
            Provider::new(Stalled),
            deployment(),
            Duration::from_millis(50),
        );

        let outcome = executor.submit(&identity(), dai_payload()).await;
        match outcome {
            ExecutionOutcome::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::Timeout);
                assert!(reason.contains("query"), "{reason}");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
