use config::{Environment, File};
use ethers::types::Address;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::distribution::{DistributionSettings, RestartPolicy, VestingTerms};
use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;

const ITERATION_PLACEHOLDER: &str = "{iteration}";
const DEFAULT_CONFIG_FILE: &str = "distribution";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub rpc_url: String,
    /// Only the distribution workflow needs a signer
    pub private_key: Option<String>,
    pub contract_address: String,
    pub chain_id: Option<u64>,

    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub batch_size: usize,
    pub inclusion_timeout_secs: u64,
    pub post_timeout_wait_secs: u64,
    pub poll_interval_ms: u64,

    pub vesting_duration_days: u64,
    pub cliff_period_days: u64,
    /// Absent means schedules start at the current height
    pub start_offset_days: Option<u64>,
    pub blocks_per_day: u64,

    pub iteration: u32,
    pub roster_file: String,
    pub records_file: String,
    pub log_file: String,

    pub max_restarts: u32,
    pub restart_backoff_ms: u64,
}

impl AppConfig {
    /// Defaults, then `distribution.toml` (or `config_path`), then `VESTING_*`
    /// environment variables. `iteration` overrides all of them.
    pub fn load(config_path: Option<&Path>, iteration: Option<u32>) -> AppResult<Self> {
        dotenv::dotenv().ok();

        let file = match config_path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut builder = config::Config::builder()
            .set_default("rpc_url", "http://127.0.0.1:8545")?
            .set_default("contract_address", "")?
            .set_default("retry_count", 3i64)?
            .set_default("retry_delay_ms", 5_000i64)?
            .set_default("batch_size", 50i64)?
            .set_default("inclusion_timeout_secs", 120i64)?
            .set_default("post_timeout_wait_secs", 10i64)?
            .set_default("poll_interval_ms", 2_000i64)?
            .set_default("vesting_duration_days", 365i64)?
            .set_default("cliff_period_days", 90i64)?
            .set_default("blocks_per_day", 7_200i64)?
            .set_default("iteration", 1i64)?
            .set_default("roster_file", "data/roster_{iteration}.csv")?
            .set_default("records_file", "data/records_{iteration}.csv")?
            .set_default("log_file", "logs/distribution_{iteration}.log")?
            .set_default("max_restarts", 3i64)?
            .set_default("restart_backoff_ms", 2_000i64)?
            .add_source(file)
            .add_source(Environment::with_prefix("VESTING").try_parsing(true));

        if let Some(iteration) = iteration {
            builder = builder.set_override("iteration", i64::from(iteration))?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.batch_size == 0 {
            return Err(AppError::Config("batch_size must be at least 1".to_string()));
        }
        if self.retry_count == 0 {
            return Err(AppError::Config("retry_count must be at least 1".to_string()));
        }
        if self.blocks_per_day == 0 {
            return Err(AppError::Config("blocks_per_day must be at least 1".to_string()));
        }
        self.contract_address()?;
        Ok(())
    }

    pub fn contract_address(&self) -> AppResult<Address> {
        Address::from_str(self.contract_address.trim()).map_err(|e| {
            AppError::Config(format!(
                "invalid contract_address {:?}: {}",
                self.contract_address, e
            ))
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn vesting_terms(&self) -> VestingTerms {
        VestingTerms {
            start_offset_blocks: self
                .start_offset_days
                .map(|days| days.saturating_mul(self.blocks_per_day)),
            cliff_blocks: self.cliff_period_days.saturating_mul(self.blocks_per_day),
            duration_blocks: self.vesting_duration_days.saturating_mul(self.blocks_per_day),
        }
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            max_restarts: self.max_restarts,
            initial_backoff: Duration::from_millis(self.restart_backoff_ms),
        }
    }

    pub fn inclusion_timeout(&self) -> Duration {
        Duration::from_secs(self.inclusion_timeout_secs)
    }

    pub fn post_timeout_wait(&self) -> Duration {
        Duration::from_secs(self.post_timeout_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn roster_path(&self) -> PathBuf {
        self.expand(&self.roster_file)
    }

    pub fn records_path(&self) -> PathBuf {
        self.expand(&self.records_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.expand(&self.log_file)
    }

    pub fn distribution_settings(&self) -> DistributionSettings {
        DistributionSettings {
            roster_path: self.roster_path(),
            records_path: self.records_path(),
            batch_size: self.batch_size,
            retry: self.retry_policy(),
            terms: self.vesting_terms(),
            inclusion_timeout: self.inclusion_timeout(),
            post_timeout_wait: self.post_timeout_wait(),
        }
    }

    // a template without the placeholder is used verbatim
    fn expand(&self, template: &str) -> PathBuf {
        PathBuf::from(template.replace(ITERATION_PLACEHOLDER, &self.iteration.to_string()))
    }
}
