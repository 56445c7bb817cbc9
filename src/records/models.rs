use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Column order of the record store
pub const RECORD_HEADER: [&str; 8] = [
    "wallet",
    "amount",
    "tx_hash",
    "status",
    "start_block",
    "cliff_block",
    "duration_blocks",
    "end_block",
];

/// Attempt status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        }
    }
}

/// Block parameters shared by every member of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTerms {
    pub start_block: u64,
    pub cliff_block: u64,
    pub duration_blocks: u64,
}

impl BlockTerms {
    pub fn end_block(&self) -> u64 {
        self.start_block.saturating_add(self.duration_blocks)
    }
}

/// One row of the append-only record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub wallet: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub tx_hash: String,
    /// Rows written by older tools may lack a status; those count as pending
    #[serde(default)]
    pub status: Option<AttemptStatus>,
    #[serde(default)]
    pub start_block: Option<u64>,
    #[serde(default)]
    pub cliff_block: Option<u64>,
    #[serde(default)]
    pub duration_blocks: Option<u64>,
    #[serde(default)]
    pub end_block: Option<u64>,
}

impl AttemptRecord {
    pub fn new(
        wallet: &str,
        amount: &str,
        tx_hash: Option<&str>,
        status: AttemptStatus,
        terms: Option<BlockTerms>,
    ) -> Self {
        Self {
            wallet: wallet.to_string(),
            amount: amount.to_string(),
            tx_hash: tx_hash.unwrap_or_default().to_string(),
            status: Some(status),
            start_block: terms.map(|t| t.start_block),
            cliff_block: terms.map(|t| t.cliff_block),
            duration_blocks: terms.map(|t| t.duration_blocks),
            end_block: terms.map(|t| t.end_block()),
        }
    }

    pub fn effective_status(&self) -> AttemptStatus {
        self.status.unwrap_or(AttemptStatus::Pending)
    }

    pub fn is_blank(&self) -> bool {
        self.wallet.trim().is_empty()
    }

    pub fn has_tx_hash(&self) -> bool {
        !self.tx_hash.trim().is_empty()
    }

    pub fn block_terms(&self) -> Option<BlockTerms> {
        Some(BlockTerms {
            start_block: self.start_block?,
            cliff_block: self.cliff_block?,
            duration_blocks: self.duration_blocks?,
        })
    }
}

/// State reconstructed from the store on startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    /// Wallet key -> its latest row, when that row is still pending
    pub pending_by_wallet: HashMap<String, PendingEntry>,
    /// Wallet keys with at least one `success` row
    pub processed_wallets: HashSet<String>,
}

/// An in-flight submission known only from a `pending` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub wallet: String,
    pub amount: String,
    pub tx_hash: String,
    pub terms: Option<BlockTerms>,
}
