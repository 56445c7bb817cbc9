// Dedup/resume planner - decides which roster rows still need a submission.
//
// Per candidate, in order:
// 1. local success already known (processed set)      -> skip
// 2. store holds a success row with a tx hash         -> skip, mark processed
// 3. chain reports an existing schedule               -> skip, mark processed
// 4. otherwise validate address/amount; invalid rows are dropped with a log
//
// The resume offset only changes traversal order. Steps 1-3 are what keep a
// wallet from being submitted twice.

use std::collections::HashSet;
use std::sync::Arc;
use serde::Serialize;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::{
    error::{AppResult, RosterError},
    gateway::LedgerGateway,
    records::RecordRepository,
    retry::{run_with_retry, RetryPolicy},
    roster::{validate_address, wallet_key, Beneficiary, BeneficiaryRow},
};

/// Why a candidate was left out of the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ProcessedLocally,
    RecordedSuccess,
    ScheduleOnChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidEntry {
    pub wallet: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Beneficiaries to submit, in traversal order
    pub pending: Vec<Beneficiary>,
    pub skipped: Vec<(String, SkipReason)>,
    pub invalid: Vec<InvalidEntry>,
    /// Roster index the traversal started from
    pub resume_offset: usize,
}

pub struct ResumePlanner {
    gateway: Arc<dyn LedgerGateway>,
    store: Arc<RecordRepository>,
    retry: RetryPolicy,
}

impl ResumePlanner {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        store: Arc<RecordRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            store,
            retry,
        }
    }

    /// Roster index right after the wallet of the store's last row.
    ///
    /// Falls back to 0 (with a warning) when that wallet is not in the roster.
    pub fn resume_offset(&self, roster: &[BeneficiaryRow]) -> usize {
        let Some(last_wallet) = self.store.last_wallet() else {
            return 0;
        };

        let key = wallet_key(&last_wallet);
        match roster.iter().position(|row| row.key() == key) {
            Some(index) => {
                let offset = (index + 1) % roster.len().max(1);
                info!(
                    "↪️ Resuming after {} (roster index {}), starting at {}",
                    last_wallet, index, offset
                );
                offset
            }
            None => {
                warn!(
                    "⚠️ Last recorded wallet {} is not in the current roster, scanning from the start",
                    last_wallet
                );
                0
            }
        }
    }

    /// Build the plan for `roster`.
    ///
    /// Traversal starts at the resume offset and wraps around, so rows before
    /// the offset are still checked after the tail of the roster.
    #[instrument(skip(self, roster), fields(roster_len = roster.len()))]
    pub async fn plan(&self, roster: &[BeneficiaryRow]) -> AppResult<Plan> {
        let resume_offset = self.resume_offset(roster);
        let mut processed: HashSet<String> = self.store.load_resume_state().processed_wallets;

        let mut plan = Plan {
            resume_offset,
            ..Default::default()
        };

        let ordered = roster
            .iter()
            .skip(resume_offset)
            .chain(roster.iter().take(resume_offset));

        for row in ordered {
            let key = row.key();
            let wallet = row.wallet.trim().to_string();

            if processed.contains(&key) {
                debug!(wallet = %wallet, "⏭️ Already processed");
                plan.skipped.push((wallet, SkipReason::ProcessedLocally));
                continue;
            }

            if let Some(tx_hash) = self.store.find_latest_success(&wallet) {
                debug!(wallet = %wallet, tx_hash = %tx_hash, "⏭️ Success already recorded");
                processed.insert(key);
                plan.skipped.push((wallet, SkipReason::RecordedSuccess));
                continue;
            }

            let address = match validate_address(&wallet) {
                Ok(address) => address,
                Err(e) => {
                    warn!(wallet = %wallet, "❌ Dropping roster row: {}", e);
                    plan.invalid.push(InvalidEntry {
                        wallet,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let gateway = self.gateway.as_ref();
            let operation = format!("read_schedule({})", wallet);
            let schedule = run_with_retry(&operation, self.retry, move || {
                gateway.read_schedule(address)
            })
            .instrument(info_span!("candidate", wallet = %wallet))
            .await?;

            if schedule.exists() {
                info!(
                    wallet = %wallet,
                    total = %schedule.total_amount,
                    "⏭️ Schedule already on chain"
                );
                processed.insert(key);
                plan.skipped.push((wallet, SkipReason::ScheduleOnChain));
                continue;
            }

            match Beneficiary::from_row(row) {
                Ok(beneficiary) => plan.pending.push(beneficiary),
                Err(e @ RosterError::InvalidAmount { .. }) | Err(e @ RosterError::InvalidAddress(_)) => {
                    warn!(wallet = %wallet, "❌ Dropping roster row: {}", e);
                    plan.invalid.push(InvalidEntry {
                        wallet,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "📊 Plan: {} to submit, {} skipped, {} invalid",
            plan.pending.len(),
            plan.skipped.len(),
            plan.invalid.len()
        );

        Ok(plan)
    }
}
