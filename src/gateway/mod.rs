pub mod evm;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use evm::{EvmConfig, EvmGateway};
pub use traits::{
    BatchInstruction, InclusionOutcome, LedgerGateway, ScheduleEntry, TxHandle, VestingSchedule,
};
