use super::models::*;
use crate::error::RecordError;
use crate::roster::wallet_key;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Record repository - THE source of truth for submission history.
///
/// Backed by an append-only CSV file. Every append is flushed and synced
/// before returning; rows already on disk are never rewritten. The in-memory
/// copy mirrors the file and is only extended after a successful sync.
pub struct RecordRepository {
    path: PathBuf,
    rows: Mutex<Vec<AttemptRecord>>,
}

impl RecordRepository {
    /// Open the store at `path`, creating it with the fixed header if absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RecordError> {
        let path = path.into();
        if Self::initialize_if_absent(&path)? {
            info!("📒 Created record store {}", path.display());
        }

        let rows = Self::read_rows(&path)?;
        info!("📒 Loaded {} records from {}", rows.len(), path.display());

        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    /// Create the store with its header. Never truncates an existing store.
    /// Returns whether a header was written.
    pub fn initialize_if_absent(path: &Path) -> Result<bool, RecordError> {
        let io_err = |source: std::io::Error| RecordError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // an empty file has no header yet
                let len = fs::metadata(path).map_err(io_err)?.len();
                if len > 0 {
                    return Ok(false);
                }
                OpenOptions::new().append(true).open(path).map_err(io_err)?
            }
            Err(e) => return Err(io_err(e)),
        };

        let mut writer = csv::WriterBuilder::new().from_writer(file);
        writer
            .write_record(RECORD_HEADER)
            .map_err(|source| RecordError::Csv {
                path: path.display().to_string(),
                source,
            })?;
        writer.flush().map_err(io_err)?;
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;

        Ok(true)
    }

    // ========== WRITES ==========

    pub fn append(&self, record: AttemptRecord) -> Result<(), RecordError> {
        self.append_all(vec![record])
    }

    /// Durably append `records` in order, then expose them to readers
    pub fn append_all(&self, records: Vec<AttemptRecord>) -> Result<(), RecordError> {
        if records.is_empty() {
            return Ok(());
        }

        let io_err = |source: std::io::Error| RecordError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let mut rows = self.rows.lock();

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        for record in &records {
            writer.serialize(record).map_err(|source| RecordError::Csv {
                path: self.path.display().to_string(),
                source,
            })?;
        }

        writer.flush().map_err(io_err)?;
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_data().map_err(io_err)?;

        rows.extend(records);
        Ok(())
    }

    // ========== READS ==========

    /// Transaction hash of the most recent `success` row for `wallet`
    pub fn find_latest_success(&self, wallet: &str) -> Option<String> {
        let key = wallet_key(wallet);
        self.rows
            .lock()
            .iter()
            .filter(|r| wallet_key(&r.wallet) == key)
            .filter(|r| r.effective_status() == AttemptStatus::Success && r.has_tx_hash())
            .last()
            .map(|r| r.tx_hash.trim().to_string())
    }

    /// Rebuild the pending index and the processed set from history.
    ///
    /// A wallet is pending when its latest row is pending; any later row
    /// supersedes the pending entry.
    pub fn load_resume_state(&self) -> ResumeState {
        let rows = self.rows.lock();

        let mut latest: HashMap<String, &AttemptRecord> = HashMap::new();
        let mut state = ResumeState::default();

        for record in rows.iter() {
            let key = wallet_key(&record.wallet);
            if record.effective_status() == AttemptStatus::Success {
                state.processed_wallets.insert(key.clone());
            }
            latest.insert(key, record);
        }

        for (key, record) in latest {
            if record.effective_status() == AttemptStatus::Pending {
                state.pending_by_wallet.insert(
                    key,
                    PendingEntry {
                        wallet: record.wallet.trim().to_string(),
                        amount: record.amount.trim().to_string(),
                        tx_hash: record.tx_hash.trim().to_string(),
                        terms: record.block_terms(),
                    },
                );
            }
        }

        state
    }

    /// Wallet of the last row that names one
    pub fn last_wallet(&self) -> Option<String> {
        self.rows
            .lock()
            .iter()
            .rev()
            .find(|r| !r.is_blank())
            .map(|r| r.wallet.trim().to_string())
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    #[cfg(test)]
    pub fn records(&self) -> Vec<AttemptRecord> {
        self.rows.lock().clone()
    }

    fn read_rows(path: &Path) -> Result<Vec<AttemptRecord>, RecordError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|source| RecordError::Csv {
                path: path.display().to_string(),
                source,
            })?;

        let mut rows = Vec::new();
        let mut skipped = 0usize;

        for result in reader.deserialize::<AttemptRecord>() {
            match result {
                Ok(record) if !record.is_blank() => rows.push(record),
                Ok(_) => skipped += 1,
                Err(e) => {
                    warn!("⚠️ Skipping malformed record in {}: {}", path.display(), e);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!("⚠️ Ignored {} blank or malformed records", skipped);
        }

        Ok(rows)
    }
}
