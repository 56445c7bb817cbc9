use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use serde::Serialize;
use std::time::Duration;

use crate::error::GatewayError;

/// On-chain vesting schedule as stored by the contract.
///
/// The contract returns a zeroed struct for unknown beneficiaries, so
/// existence is signalled by a non-zero total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VestingSchedule {
    pub beneficiary: Address,
    pub total_amount: U256,
    pub released_amount: U256,
    pub start_block: u64,
    pub duration_blocks: u64,
    pub cliff_block: u64,
}

impl VestingSchedule {
    pub fn absent(beneficiary: Address) -> Self {
        Self {
            beneficiary,
            total_amount: U256::zero(),
            released_amount: U256::zero(),
            start_block: 0,
            duration_blocks: 0,
            cliff_block: 0,
        }
    }

    pub fn exists(&self) -> bool {
        !self.total_amount.is_zero()
    }

    pub fn end_block(&self) -> u64 {
        self.start_block.saturating_add(self.duration_blocks)
    }
}

/// One beneficiary's entry inside a batch instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub beneficiary: Address,
    pub amount: U256,
    pub start_block: u64,
    pub duration_blocks: u64,
    pub cliff_block: u64,
}

/// A single on-chain call creating every schedule of one batch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchInstruction {
    pub entries: Vec<ScheduleEntry>,
}

impl BatchInstruction {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifier of a transaction accepted by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle {
    pub hash: TxHash,
}

impl TxHandle {
    pub fn new(hash: TxHash) -> Self {
        Self { hash }
    }

    /// 0x-prefixed lowercase hex, as written to the record store
    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionOutcome {
    /// Mined with a successful receipt
    Included { block: Option<u64> },
    /// Mined, but execution reverted
    Reverted { block: Option<u64> },
    /// No receipt within the inclusion timeout
    TimedOut,
    /// The node no longer knows the transaction
    Dropped,
}


/// Ledger gateway - the only way the pipeline touches the chain
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Latest block height
    async fn current_height(&self) -> Result<u64, GatewayError>;

    /// Schedule stored for `beneficiary`; a zeroed schedule when none exists
    async fn read_schedule(&self, beneficiary: Address) -> Result<VestingSchedule, GatewayError>;

    /// Submit one batch instruction as a single transaction
    async fn submit(&self, instruction: &BatchInstruction) -> Result<TxHandle, GatewayError>;

    /// Wait for the transaction to be mined, bounded by `timeout`
    async fn await_inclusion(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<InclusionOutcome, GatewayError>;
}
