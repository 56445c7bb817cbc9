// Input roster - `wallet,total` rows loaded once per run.

use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::RosterError;

/// Raw roster row, exactly as read from the file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BeneficiaryRow {
    pub wallet: String,
    #[serde(default)]
    pub total: String,
}

impl BeneficiaryRow {
    #[cfg(test)]
    pub fn new(wallet: impl Into<String>, total: impl Into<String>) -> Self {
        Self {
            wallet: wallet.into(),
            total: total.into(),
        }
    }

    pub fn key(&self) -> String {
        wallet_key(&self.wallet)
    }
}

/// A roster row that passed address and amount validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beneficiary {
    /// Wallet text as it appears in the roster
    pub wallet: String,
    pub address: Address,
    pub amount: U256,
}

impl Beneficiary {
    pub fn from_row(row: &BeneficiaryRow) -> Result<Self, RosterError> {
        let address = validate_address(&row.wallet)?;
        let amount = parse_amount(&row.wallet, &row.total)?;
        Ok(Self {
            wallet: row.wallet.trim().to_string(),
            address,
            amount,
        })
    }
}

/// Case-insensitive identity used for dedup across roster and store
pub fn wallet_key(wallet: &str) -> String {
    wallet.trim().to_ascii_lowercase()
}

/// `0x` followed by 40 hex digits. Mixed-case input must carry a valid
/// EIP-55 checksum; all-lower and all-upper input is accepted as is.
pub fn validate_address(wallet: &str) -> Result<Address, RosterError> {
    let wallet = wallet.trim();
    let invalid = || RosterError::InvalidAddress(wallet.to_string());

    let hex = wallet.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let address = Address::from_str(hex).map_err(|_| invalid())?;

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address, None) != wallet {
        return Err(invalid());
    }

    Ok(address)
}

/// Non-negative base-10 integer in the token's smallest unit
pub fn parse_amount(wallet: &str, total: &str) -> Result<U256, RosterError> {
    let total = total.trim();
    let invalid = || RosterError::InvalidAmount {
        wallet: wallet.trim().to_string(),
        amount: total.to_string(),
    };

    if total.is_empty() || !total.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    U256::from_dec_str(total).map_err(|_| invalid())
}

/// Load the roster, dropping blank rows and failing on duplicate wallets.
///
/// Duplicate detection happens here, before any network call is made.
pub fn load_roster(path: &Path) -> Result<Vec<BeneficiaryRow>, RosterError> {
    let rows = read_rows(path)?;

    let mut seen: HashMap<String, u64> = HashMap::new();
    for (line, row) in &rows {
        if let Some(first_line) = seen.insert(row.key(), *line) {
            return Err(RosterError::DuplicateWallet {
                wallet: row.wallet.trim().to_string(),
                first_line,
                line: *line,
            });
        }
    }

    Ok(rows.into_iter().map(|(_, row)| row).collect())
}

/// Wallet column only, duplicates allowed. Used by the verification workflow.
pub fn load_addresses(path: &Path) -> Result<Vec<String>, RosterError> {
    Ok(read_rows(path)?
        .into_iter()
        .map(|(_, row)| row.wallet.trim().to_string())
        .collect())
}

fn read_rows(path: &Path) -> Result<Vec<(u64, BeneficiaryRow)>, RosterError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| RosterError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let io_error = |e: csv::Error| RosterError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let headers = reader.headers().map_err(io_error)?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| RosterError::Malformed {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            message: e.to_string(),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let row: BeneficiaryRow =
            record
                .deserialize(Some(&headers))
                .map_err(|e| RosterError::Malformed {
                    line,
                    message: e.to_string(),
                })?;

        if row.wallet.trim().is_empty() {
            continue;
        }

        rows.push((line, row));
    }

    Ok(rows)
}
