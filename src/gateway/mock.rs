// Scripted in-memory gateway for pipeline tests.

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::{
    error::GatewayError,
    gateway::traits::{
        BatchInstruction, InclusionOutcome, LedgerGateway, TxHandle, VestingSchedule,
    },
};

#[derive(Default)]
struct MockState {
    height: u64,
    schedules: HashMap<Address, VestingSchedule>,
    height_failures: u32,
    read_failures: u32,
    submit_failures: u32,
    inclusion: Option<InclusionOutcome>,
    inclusion_error: bool,
    submitted: Vec<BatchInstruction>,
    reads: Vec<Address>,
    next_tx: u64,
}

pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new(height: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                height,
                next_tx: 1,
                ..Default::default()
            }),
        }
    }

    /// Pretend a schedule was created out of band
    pub fn with_schedule(self, beneficiary: Address, total: u64, released: u64) -> Self {
        self.state.lock().schedules.insert(
            beneficiary,
            VestingSchedule {
                beneficiary,
                total_amount: U256::from(total),
                released_amount: U256::from(released),
                start_block: 100,
                duration_blocks: 1_000,
                cliff_block: 200,
            },
        );
        self
    }

    pub fn fail_height(self, times: u32) -> Self {
        self.state.lock().height_failures = times;
        self
    }

    pub fn fail_reads(self, times: u32) -> Self {
        self.state.lock().read_failures = times;
        self
    }

    pub fn fail_submits(self, times: u32) -> Self {
        self.state.lock().submit_failures = times;
        self
    }

    /// Outcome reported by every inclusion wait; defaults to `Included`
    pub fn with_inclusion(self, outcome: InclusionOutcome) -> Self {
        self.state.lock().inclusion = Some(outcome);
        self
    }

    /// Every inclusion wait fails with an RPC error
    pub fn fail_inclusion(self) -> Self {
        self.state.lock().inclusion_error = true;
        self
    }

    pub fn submitted(&self) -> Vec<BatchInstruction> {
        self.state.lock().submitted.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().reads.len()
    }

    pub fn has_schedule(&self, beneficiary: Address) -> bool {
        self.state
            .lock()
            .schedules
            .get(&beneficiary)
            .map(|s| s.exists())
            .unwrap_or(false)
    }
}

#[async_trait]
impl LedgerGateway for MockGateway {
    async fn current_height(&self) -> Result<u64, GatewayError> {
        let mut state = self.state.lock();
        if state.height_failures > 0 {
            state.height_failures -= 1;
            return Err(GatewayError::Rpc("height unavailable".into()));
        }
        Ok(state.height)
    }

    async fn read_schedule(&self, beneficiary: Address) -> Result<VestingSchedule, GatewayError> {
        let mut state = self.state.lock();
        state.reads.push(beneficiary);
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(GatewayError::Rpc("read unavailable".into()));
        }
        Ok(state
            .schedules
            .get(&beneficiary)
            .cloned()
            .unwrap_or_else(|| VestingSchedule::absent(beneficiary)))
    }

    async fn submit(&self, instruction: &BatchInstruction) -> Result<TxHandle, GatewayError> {
        let mut state = self.state.lock();
        if state.submit_failures > 0 {
            state.submit_failures -= 1;
            return Err(GatewayError::Contract("nonce too low".into()));
        }

        for entry in &instruction.entries {
            state.schedules.insert(
                entry.beneficiary,
                VestingSchedule {
                    beneficiary: entry.beneficiary,
                    total_amount: entry.amount,
                    released_amount: U256::zero(),
                    start_block: entry.start_block,
                    duration_blocks: entry.duration_blocks,
                    cliff_block: entry.cliff_block,
                },
            );
        }
        state.submitted.push(instruction.clone());

        let hash = TxHash::from_low_u64_be(state.next_tx);
        state.next_tx += 1;
        Ok(TxHandle::new(hash))
    }

    async fn await_inclusion(
        &self,
        _handle: &TxHandle,
        _timeout: Duration,
    ) -> Result<InclusionOutcome, GatewayError> {
        let state = self.state.lock();
        if state.inclusion_error {
            return Err(GatewayError::Rpc("receipt polling failed".into()));
        }
        Ok(state.inclusion.unwrap_or(InclusionOutcome::Included {
            block: Some(state.height + 1),
        }))
    }
}
