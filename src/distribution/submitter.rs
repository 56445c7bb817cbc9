// Batch submitter - one transaction per batch, outcome recorded per beneficiary.
//
// Flow:
// 1. Read the chain height (retry executor)
// 2. Derive the batch's shared start/cliff/duration
// 3. Submit the batch instruction (own retry loop); on acceptance every member
//    gets a `pending` row under the transaction hash
// 4. Wait for inclusion under the configured timeout
// 5. Included -> `success` rows; reverted or never accepted -> `failed` rows;
//    timed out or dropped -> the `pending` rows stand and the next run's
//    reconciliation settles them against chain state

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    distribution::VestingTerms,
    error::{AppError, AppResult, GatewayError},
    gateway::{BatchInstruction, InclusionOutcome, LedgerGateway, ScheduleEntry, TxHandle},
    records::{AttemptRecord, AttemptStatus, BlockTerms, RecordRepository},
    retry::{run_with_retry, RetryPolicy},
    roster::Beneficiary,
};

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub retry: RetryPolicy,
    pub terms: VestingTerms,
    pub inclusion_timeout: Duration,
    /// Pause after an indeterminate inclusion before moving on
    pub post_timeout_wait: Duration,
}

pub struct BatchSubmitter {
    config: SubmitterConfig,
    gateway: Arc<dyn LedgerGateway>,
    store: Arc<RecordRepository>,
}

impl BatchSubmitter {
    pub fn new(
        config: SubmitterConfig,
        gateway: Arc<dyn LedgerGateway>,
        store: Arc<RecordRepository>,
    ) -> Self {
        Self {
            config,
            gateway,
            store,
        }
    }

    /// Submit `batch` as a single transaction and record the outcome.
    ///
    /// Returns whether the transaction was accepted and not reverted. Only
    /// record store failures are returned as errors; chain failures degrade
    /// the batch to `failed` rows.
    #[instrument(
        skip(self, batch),
        fields(
            batch_size = batch.len(),
            first_wallet = %batch.first().map(|b| b.wallet.as_str()).unwrap_or_default(),
            last_wallet = %batch.last().map(|b| b.wallet.as_str()).unwrap_or_default(),
        )
    )]
    pub async fn submit_batch(&self, batch: &[Beneficiary]) -> AppResult<bool> {
        if batch.is_empty() {
            return Err(AppError::InvalidInput("cannot submit an empty batch".to_string()));
        }
        let wallets = wallet_list(batch);

        let gateway = self.gateway.as_ref();
        let height = match run_with_retry("current_height", self.config.retry, move || {
            gateway.current_height()
        })
        .await
        {
            Ok(height) => height,
            Err(e) => {
                error!(wallets = %wallets, "❌ Could not read chain height, failing batch: {}", e);
                self.record_all(batch, AttemptStatus::Failed, None, None)?;
                return Ok(false);
            }
        };

        let terms = self.config.terms.at_height(height);
        let instruction = Self::build_instruction(batch, &terms);

        info!(
            height,
            start_block = terms.start_block,
            cliff_block = terms.cliff_block,
            duration_blocks = terms.duration_blocks,
            "🚀 Submitting batch of {}",
            batch.len()
        );

        let handle = match self.submit_with_retry(&instruction).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    wallets = %wallets,
                    "❌ Batch submission failed after {} attempts: {}",
                    self.config.retry.max_attempts, e
                );
                self.record_all(batch, AttemptStatus::Failed, None, Some(terms))?;
                return Ok(false);
            }
        };

        let tx_hash = handle.to_hex();
        self.record_all(batch, AttemptStatus::Pending, Some(&tx_hash), Some(terms))?;
        info!(tx_hash = %tx_hash, "📨 Batch accepted, awaiting inclusion");

        match self
            .gateway
            .await_inclusion(&handle, self.config.inclusion_timeout)
            .await
        {
            Ok(InclusionOutcome::Included { block }) => {
                info!(tx_hash = %tx_hash, block = ?block, "✓ Batch included");
                self.record_all(batch, AttemptStatus::Success, Some(&tx_hash), Some(terms))?;
                Ok(true)
            }
            Ok(InclusionOutcome::Reverted { block }) => {
                error!(
                    tx_hash = %tx_hash,
                    block = ?block,
                    wallets = %wallets,
                    "❌ Batch transaction reverted"
                );
                self.record_all(batch, AttemptStatus::Failed, Some(&tx_hash), Some(terms))?;
                Ok(false)
            }
            Ok(outcome) => {
                warn!(
                    tx_hash = %tx_hash,
                    wallets = %wallets,
                    outcome = ?outcome,
                    "⏳ Inclusion not confirmed, leaving batch pending for reconciliation"
                );
                tokio::time::sleep(self.config.post_timeout_wait).await;
                Ok(true)
            }
            Err(e) => {
                warn!(
                    tx_hash = %tx_hash,
                    wallets = %wallets,
                    "⏳ Inclusion wait failed ({}), leaving batch pending for reconciliation",
                    e
                );
                tokio::time::sleep(self.config.post_timeout_wait).await;
                Ok(true)
            }
        }
    }

    /// Submission keeps its own loop: the pending rows are tied to the
    /// handle it returns, not to a generic retried value.
    async fn submit_with_retry(&self, instruction: &BatchInstruction) -> Result<TxHandle, GatewayError> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.gateway.submit(instruction).await {
                Ok(handle) => return Ok(handle),
                Err(e) if attempt < max_attempts => {
                    warn!(attempt, max_attempts, "⚠️ Batch submission failed: {}", e);
                    tokio::time::sleep(self.config.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, max_attempts, "⚠️ Batch submission failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    fn build_instruction(batch: &[Beneficiary], terms: &BlockTerms) -> BatchInstruction {
        BatchInstruction {
            entries: batch
                .iter()
                .map(|b| ScheduleEntry {
                    beneficiary: b.address,
                    amount: b.amount,
                    start_block: terms.start_block,
                    duration_blocks: terms.duration_blocks,
                    cliff_block: terms.cliff_block,
                })
                .collect(),
        }
    }

    fn record_all(
        &self,
        batch: &[Beneficiary],
        status: AttemptStatus,
        tx_hash: Option<&str>,
        terms: Option<BlockTerms>,
    ) -> AppResult<()> {
        let records = batch
            .iter()
            .map(|b| AttemptRecord::new(&b.wallet, &b.amount.to_string(), tx_hash, status, terms))
            .collect();
        self.store.append_all(records)?;
        debug!(status = %status, "📝 Recorded {} attempt rows", batch.len());
        Ok(())
    }
}

/// Comma-separated wallets of a batch, for failure logs
fn wallet_list(batch: &[Beneficiary]) -> String {
    batch
        .iter()
        .map(|b| b.wallet.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use ethers::types::{Address, U256};
    use tempfile::TempDir;

    fn beneficiaries(n: u64) -> Vec<Beneficiary> {
        (1..=n)
            .map(|i| {
                let address = Address::from_low_u64_be(i);
                Beneficiary {
                    wallet: format!("{:#x}", address),
                    address,
                    amount: U256::from(1_000 * i),
                }
            })
            .collect()
    }

    fn config() -> SubmitterConfig {
        SubmitterConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            terms: VestingTerms {
                start_offset_blocks: Some(7_200),
                cliff_blocks: 100,
                duration_blocks: 1_000,
            },
            inclusion_timeout: Duration::from_secs(1),
            post_timeout_wait: Duration::ZERO,
        }
    }

    fn fixture(gateway: MockGateway) -> (TempDir, Arc<MockGateway>, Arc<RecordRepository>, BatchSubmitter) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordRepository::open(dir.path().join("records.csv")).unwrap());
        let gateway = Arc::new(gateway);
        let submitter = BatchSubmitter::new(config(), gateway.clone(), store.clone());
        (dir, gateway, store, submitter)
    }

    fn statuses(store: &RecordRepository) -> Vec<AttemptStatus> {
        store.records().iter().map(|r| r.effective_status()).collect()
    }

    #[tokio::test]
    async fn test_included_batch_records_success_with_shared_terms() {
        let (_dir, gateway, store, submitter) = fixture(MockGateway::new(10_000));
        let batch = beneficiaries(3);

        assert!(submitter.submit_batch(&batch).await.unwrap());

        let submitted = gateway.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].len(), 3);
        for entry in &submitted[0].entries {
            assert_eq!(entry.start_block, 17_200);
            assert_eq!(entry.cliff_block, 17_300);
            assert_eq!(entry.duration_blocks, 1_000);
        }

        use AttemptStatus::*;
        assert_eq!(statuses(&store), vec![Pending, Pending, Pending, Success, Success, Success]);

        let records = store.records();
        let last = records.last().unwrap();
        assert_eq!(last.end_block, Some(18_200));
        assert_eq!(last.amount, "3000");
        assert!(last.has_tx_hash());

        let state = store.load_resume_state();
        assert!(state.pending_by_wallet.is_empty());
        assert_eq!(state.processed_wallets.len(), 3);
    }

    #[tokio::test]
    async fn test_transient_submit_failures_are_retried() {
        let (_dir, gateway, store, submitter) = fixture(MockGateway::new(10).fail_submits(2));

        assert!(submitter.submit_batch(&beneficiaries(1)).await.unwrap());
        assert_eq!(gateway.submitted().len(), 1);
        assert!(store.find_latest_success(&beneficiaries(1)[0].wallet).is_some());
    }

    #[tokio::test]
    async fn test_exhausted_submission_records_failed_rows() {
        let (_dir, gateway, store, submitter) = fixture(MockGateway::new(10).fail_submits(3));

        assert!(!submitter.submit_batch(&beneficiaries(2)).await.unwrap());
        assert!(gateway.submitted().is_empty());

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.effective_status() == AttemptStatus::Failed && !r.has_tx_hash()));
        assert!(store.load_resume_state().pending_by_wallet.is_empty());
    }

    #[tokio::test]
    async fn test_inclusion_timeout_still_writes_records() {
        let (_dir, _gateway, store, submitter) =
            fixture(MockGateway::new(10).with_inclusion(InclusionOutcome::TimedOut));

        assert!(submitter.submit_batch(&beneficiaries(2)).await.unwrap());

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.effective_status() == AttemptStatus::Pending && r.has_tx_hash()));
        assert_eq!(store.load_resume_state().pending_by_wallet.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_rows_pending() {
        let (_dir, _gateway, store, submitter) =
            fixture(MockGateway::new(10).with_inclusion(InclusionOutcome::Dropped));

        assert!(submitter.submit_batch(&beneficiaries(3)).await.unwrap());

        let records = store.records();
        assert_eq!(records.len(), 3);
        assert!(records
            .iter()
            .all(|r| r.effective_status() == AttemptStatus::Pending && r.has_tx_hash()));
        assert_eq!(store.load_resume_state().pending_by_wallet.len(), 3);
    }

    #[tokio::test]
    async fn test_inclusion_wait_error_leaves_rows_pending() {
        let (_dir, gateway, store, submitter) = fixture(MockGateway::new(10).fail_inclusion());

        assert!(submitter.submit_batch(&beneficiaries(2)).await.unwrap());
        assert_eq!(gateway.submitted().len(), 1);

        let state = store.load_resume_state();
        assert_eq!(state.pending_by_wallet.len(), 2);
        assert!(state.processed_wallets.is_empty());
        assert!(state.pending_by_wallet.values().all(|p| p.terms.is_some()));
    }

    #[test]
    fn test_wallet_list_names_every_member() {
        let batch = beneficiaries(2);
        assert_eq!(
            wallet_list(&batch),
            format!("{},{}", batch[0].wallet, batch[1].wallet)
        );
    }

    #[tokio::test]
    async fn test_reverted_batch_is_failed_with_hash() {
        let (_dir, _gateway, store, submitter) =
            fixture(MockGateway::new(10).with_inclusion(InclusionOutcome::Reverted { block: Some(11) }));

        assert!(!submitter.submit_batch(&beneficiaries(1)).await.unwrap());

        use AttemptStatus::*;
        assert_eq!(statuses(&store), vec![Pending, Failed]);
        assert!(store.records()[1].has_tx_hash());
    }

    #[tokio::test]
    async fn test_height_failure_fails_batch() {
        let (_dir, gateway, store, submitter) = fixture(MockGateway::new(10).fail_height(3));

        assert!(!submitter.submit_batch(&beneficiaries(2)).await.unwrap());
        assert!(gateway.submitted().is_empty());
        assert_eq!(statuses(&store), vec![AttemptStatus::Failed, AttemptStatus::Failed]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let (_dir, _gateway, _store, submitter) = fixture(MockGateway::new(10));
        assert!(submitter.submit_batch(&[]).await.is_err());
    }
}
