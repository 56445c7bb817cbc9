// Reconciliation - settles `pending` rows left by a previous run.
//
// A pending row means a batch was accepted by the node but its inclusion was
// never confirmed (timeout, dropped receipt, crash). The chain decides:
// an existing schedule promotes the wallet to `success` under the recorded
// hash; otherwise the wallet stays unsettled and the planner picks it up.

use std::sync::Arc;
use tracing::{info, info_span, instrument, warn, Instrument};

use crate::{
    error::AppResult,
    gateway::LedgerGateway,
    records::{AttemptRecord, AttemptStatus, RecordRepository},
    retry::{run_with_retry, RetryPolicy},
    roster::validate_address,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub confirmed: Vec<String>,
    pub unresolved: Vec<String>,
}

pub struct SettlementReconciler {
    gateway: Arc<dyn LedgerGateway>,
    store: Arc<RecordRepository>,
    retry: RetryPolicy,
}

impl SettlementReconciler {
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

    #[instrument(skip(self))]
    pub async fn reconcile_pending(&self) -> AppResult<ReconcileReport> {
        let mut pending: Vec<_> = self
            .store
            .load_resume_state()
            .pending_by_wallet
            .into_values()
            .collect();
        pending.sort_by(|a, b| a.wallet.cmp(&b.wallet));

        let mut report = ReconcileReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        info!("🔄 Reconciling {} pending records", pending.len());

        for entry in pending {
            let address = match validate_address(&entry.wallet) {
                Ok(address) => address,
                Err(e) => {
                    warn!(wallet = %entry.wallet, "⚠️ Pending record has an invalid wallet: {}", e);
                    report.unresolved.push(entry.wallet);
                    continue;
                }
            };

            let gateway = self.gateway.as_ref();
            let operation = format!("read_schedule({})", entry.wallet);
            let schedule = run_with_retry(&operation, self.retry, move || {
                gateway.read_schedule(address)
            })
            .instrument(info_span!("pending", wallet = %entry.wallet, tx_hash = %entry.tx_hash))
            .await?;

            if schedule.exists() && !entry.tx_hash.is_empty() {
                info!(
                    wallet = %entry.wallet,
                    tx_hash = %entry.tx_hash,
                    "✓ Pending submission confirmed on chain"
                );
                self.store.append(AttemptRecord::new(
                    &entry.wallet,
                    &entry.amount,
                    Some(&entry.tx_hash),
                    AttemptStatus::Success,
                    entry.terms,
                ))?;
                report.confirmed.push(entry.wallet);
            } else {
                warn!(
                    wallet = %entry.wallet,
                    tx_hash = %entry.tx_hash,
                    "⚠️ Pending submission not found on chain, leaving it to the planner"
                );
                report.unresolved.push(entry.wallet);
            }
        }

        Ok(report)
    }
}
