pub mod planner;
pub mod reconciler;
pub mod submitter;
pub mod supervisor;

pub use supervisor::{supervise, RestartPolicy, RunHandle};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use planner::{InvalidEntry, ResumePlanner};
use reconciler::SettlementReconciler;
use submitter::{BatchSubmitter, SubmitterConfig};

use crate::{
    error::AppResult,
    gateway::LedgerGateway,
    records::{BlockTerms, RecordRepository},
    retry::RetryPolicy,
    roster::load_roster,
};

/// Vesting parameters shared by every member of a batch, in blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VestingTerms {
    /// Distance from the current height to the start block; `None` starts at
    /// the current height
    pub start_offset_blocks: Option<u64>,
    pub cliff_blocks: u64,
    pub duration_blocks: u64,
}

impl VestingTerms {
    pub fn at_height(&self, height: u64) -> BlockTerms {
        let start_block = height.saturating_add(self.start_offset_blocks.unwrap_or(0));
        BlockTerms {
            start_block,
            cliff_block: start_block.saturating_add(self.cliff_blocks),
            duration_blocks: self.duration_blocks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistributionSettings {
    pub roster_path: PathBuf,
    pub records_path: PathBuf,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub terms: VestingTerms,
    pub inclusion_timeout: Duration,
    pub post_timeout_wait: Duration,
}

/// Outcome of one distribution run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reconciled: usize,
    pub resume_offset: usize,
    pub planned: usize,
    pub skipped: usize,
    pub invalid: usize,
    /// Rows dropped by validation, with the reason
    pub invalid_entries: Vec<InvalidEntry>,
    /// Pending wallets whose schedule was not found on chain
    pub unresolved: Vec<String>,
    pub batches_ok: usize,
    pub batches_failed: usize,
}

/// Distribution pipeline: reconcile, plan, then submit batches in order
pub struct DistributionService {
    gateway: Arc<dyn LedgerGateway>,
    settings: DistributionSettings,
}

impl DistributionService {
    pub fn new(gateway: Arc<dyn LedgerGateway>, settings: DistributionSettings) -> Self {
        Self { gateway, settings }
    }

    /// One full pass over the roster.
    ///
    /// Batches run strictly one after another; a failed batch is recorded and
    /// the run moves on to the next one.
    #[instrument(skip(self, handle), fields(roster = %self.settings.roster_path.display()))]
    pub async fn run(&self, handle: &RunHandle) -> AppResult<RunSummary> {
        let _guard = handle.try_acquire()?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!("🚀 Distribution run {} started", run_id);

        let roster = load_roster(&self.settings.roster_path)?;
        info!("📋 Loaded {} roster rows", roster.len());

        let store = Arc::new(RecordRepository::open(&self.settings.records_path)?);
        info!("📒 {} attempt records on file", store.len());

        let reconciled = SettlementReconciler::new(
            self.gateway.clone(),
            store.clone(),
            self.settings.retry,
        )
        .reconcile_pending()
        .await?;

        let plan = ResumePlanner::new(self.gateway.clone(), store.clone(), self.settings.retry)
            .plan(&roster)
            .await?;

        let submitter = BatchSubmitter::new(
            SubmitterConfig {
                retry: self.settings.retry,
                terms: self.settings.terms,
                inclusion_timeout: self.settings.inclusion_timeout,
                post_timeout_wait: self.settings.post_timeout_wait,
            },
            self.gateway.clone(),
            store.clone(),
        );

        let batch_size = self.settings.batch_size.max(1);
        let total_batches = plan.pending.len().div_ceil(batch_size);
        let mut batches_ok = 0;
        let mut batches_failed = 0;

        for (index, batch) in plan.pending.chunks(batch_size).enumerate() {
            info!("📦 Batch {}/{} ({} beneficiaries)", index + 1, total_batches, batch.len());
            if submitter.submit_batch(batch).await? {
                batches_ok += 1;
            } else {
                batches_failed += 1;
                warn!("⚠️ Batch {}/{} failed, continuing", index + 1, total_batches);
            }
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            reconciled: reconciled.confirmed.len(),
            resume_offset: plan.resume_offset,
            planned: plan.pending.len(),
            skipped: plan.skipped.len(),
            invalid: plan.invalid.len(),
            invalid_entries: plan.invalid,
            unresolved: reconciled.unresolved,
            batches_ok,
            batches_failed,
        };

        info!(
            reconciled = summary.reconciled,
            planned = summary.planned,
            skipped = summary.skipped,
            invalid = summary.invalid,
            unresolved = summary.unresolved.len(),
            batches_ok,
            batches_failed,
            "✅ Distribution run {} finished",
            run_id
        );

        Ok(summary)
    }
}
