use async_trait::async_trait;
use ethers::{
    contract::abigen,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, U256},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    error::GatewayError,
    retry::{run_with_retry, RetryPolicy},
    gateway::traits::{
        BatchInstruction, InclusionOutcome, LedgerGateway, TxHandle, VestingSchedule,
    },
};

abigen!(
    VestingContract,
    r#"[
        function createVestingSchedulesBatch(address[] beneficiaries, uint256[] amounts, uint256[] startBlocks, uint256[] durations, uint256[] cliffs) external
        function vestingSchedules(address beneficiary) external view returns (address, uint256, uint256, uint256, uint256, uint256)
    ]"#
);

pub type EthSigner = SignerMiddleware<Provider<Http>, LocalWallet>;

#[derive(Debug, Clone)]
pub struct EvmConfig {
    pub rpc_url: String,
    pub contract_address: Address,
    /// Fetched from the node when absent
    pub chain_id: Option<u64>,
    pub poll_interval: Duration,
}

/// Ledger gateway backed by an EVM JSON-RPC node
pub struct EvmGateway {
    config: EvmConfig,
    provider: Arc<Provider<Http>>,
    signer: Option<Arc<EthSigner>>,
}

impl EvmGateway {
    /// Read-only gateway, used by the verification workflow
    pub fn read_only(config: EvmConfig) -> Result<Self, GatewayError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| GatewayError::Rpc(format!("Invalid RPC url {}: {}", config.rpc_url, e)))?
            .interval(config.poll_interval);

        Ok(Self {
            config,
            provider: Arc::new(provider),
            signer: None,
        })
    }

    /// Gateway able to submit transactions signed with `private_key`.
    ///
    /// When no chain id is configured it is read from the node under `retry`.
    pub async fn with_signer(
        config: EvmConfig,
        private_key: &str,
        retry: RetryPolicy,
    ) -> Result<Self, GatewayError> {
        let mut gateway = Self::read_only(config)?;

        let chain_id = match gateway.config.chain_id {
            Some(id) => id,
            None => {
                let provider = gateway.provider.as_ref();
                run_with_retry("get_chainid", retry, move || provider.get_chainid())
                    .await
                    .map_err(|e| GatewayError::Rpc(format!("Failed to get chain id: {}", e)))?
                    .as_u64()
            }
        };

        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| GatewayError::Signer(e.to_string()))?
            .with_chain_id(chain_id);

        info!(
            "✅ Signer {:?} ready on chain {}",
            wallet.address(),
            chain_id
        );

        gateway.signer = Some(Arc::new(SignerMiddleware::new(
            (*gateway.provider).clone(),
            wallet,
        )));
        Ok(gateway)
    }

    fn to_height(value: U256) -> Result<u64, GatewayError> {
        if value > U256::from(u64::MAX) {
            return Err(GatewayError::HeightOverflow {
                value: value.to_string(),
            });
        }
        Ok(value.as_u64())
    }
}

#[async_trait]
impl LedgerGateway for EvmGateway {
    async fn current_height(&self) -> Result<u64, GatewayError> {
        let height = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| GatewayError::Rpc(format!("Failed to get block number: {}", e)))?;
        Ok(height.as_u64())
    }

    async fn read_schedule(&self, beneficiary: Address) -> Result<VestingSchedule, GatewayError> {
        let contract = VestingContract::new(self.config.contract_address, self.provider.clone());

        let (_, total_amount, released_amount, start_block, duration, cliff) = contract
            .vesting_schedules(beneficiary)
            .call()
            .await
            .map_err(|e| GatewayError::Contract(format!("vestingSchedules: {}", e)))?;

        if total_amount.is_zero() {
            return Ok(VestingSchedule::absent(beneficiary));
        }

        Ok(VestingSchedule {
            beneficiary,
            total_amount,
            released_amount,
            start_block: Self::to_height(start_block)?,
            duration_blocks: Self::to_height(duration)?,
            cliff_block: Self::to_height(cliff)?,
        })
    }

    async fn submit(&self, instruction: &BatchInstruction) -> Result<TxHandle, GatewayError> {
        let signer = self.signer.clone().ok_or(GatewayError::ReadOnly)?;
        if instruction.is_empty() {
            return Err(GatewayError::Contract("refusing to submit an empty batch".to_string()));
        }
        let contract = VestingContract::new(self.config.contract_address, signer);

        let entries = &instruction.entries;
        let call = contract.create_vesting_schedules_batch(
            entries.iter().map(|e| e.beneficiary).collect(),
            entries.iter().map(|e| e.amount).collect(),
            entries.iter().map(|e| U256::from(e.start_block)).collect(),
            entries.iter().map(|e| U256::from(e.duration_blocks)).collect(),
            entries.iter().map(|e| U256::from(e.cliff_block)).collect(),
        );

        let pending = call
            .send()
            .await
            .map_err(|e| GatewayError::Contract(format!("createVestingSchedulesBatch: {}", e)))?;

        let handle = TxHandle::new(*pending);
        debug!(entries = instruction.len(), "Transaction sent with hash: {}", handle.to_hex());
        Ok(handle)
    }

    async fn await_inclusion(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<InclusionOutcome, GatewayError> {
        let pending = PendingTransaction::new(handle.hash, self.provider.as_ref())
            .interval(self.config.poll_interval);

        let receipt = match tokio::time::timeout(timeout, pending).await {
            Err(_) => return Ok(InclusionOutcome::TimedOut),
            Ok(result) => result
                .map_err(|e| GatewayError::Rpc(format!("Failed to get receipt: {}", e)))?,
        };

        let outcome = match receipt {
            None => InclusionOutcome::Dropped,
            Some(receipt) => {
                let block = receipt.block_number.map(|b| b.as_u64());
                if receipt.status == Some(1u64.into()) {
                    InclusionOutcome::Included { block }
                } else {
                    InclusionOutcome::Reverted { block }
                }
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EvmConfig {
        EvmConfig {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: Address::from_low_u64_be(1),
            chain_id: Some(31337),
            poll_interval: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_to_height_bounds() {
        assert_eq!(EvmGateway::to_height(U256::from(42u64)).unwrap(), 42);
        assert!(EvmGateway::to_height(U256::from(u64::MAX) + 1).is_err());
    }

    #[test]
    fn test_invalid_rpc_url_rejected() {
        let mut cfg = config();
        cfg.rpc_url = "not a url".to_string();
        assert!(EvmGateway::read_only(cfg).is_err());
    }

    #[tokio::test]
    async fn test_read_only_gateway_refuses_submission() {
        let gateway = EvmGateway::read_only(config()).unwrap();
        let result = gateway.submit(&BatchInstruction::default()).await;
        assert!(matches!(result, Err(GatewayError::ReadOnly)));
    }

    #[tokio::test]
    async fn test_signer_rejects_malformed_key() {
        let result =
            EvmGateway::with_signer(config(), "definitely-not-hex", RetryPolicy::default()).await;
        assert!(matches!(result, Err(GatewayError::Signer(_))));
    }

    #[tokio::test]
    async fn test_chain_id_lookup_is_retried() {
        let mut cfg = config();
        // nothing listens on port 1
        cfg.rpc_url = "http://127.0.0.1:1".to_string();
        cfg.chain_id = None;

        let result = EvmGateway::with_signer(
            cfg,
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
        .await;

        match result {
            Err(GatewayError::Rpc(message)) => {
                assert!(message.contains("RetryExhausted"));
                assert!(message.contains("after 2 attempts"));
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}
