use std::sync::Arc;
use tracing::info;

use crate::{
    config::AppConfig,
    distribution::DistributionService,
    error::{AppError, AppResult},
    gateway::{EvmConfig, EvmGateway, LedgerGateway},
    inspection::ScheduleInspector,
};

fn evm_config(config: &AppConfig) -> AppResult<EvmConfig> {
    Ok(EvmConfig {
        rpc_url: config.rpc_url.clone(),
        contract_address: config.contract_address()?,
        chain_id: config.chain_id,
        poll_interval: config.poll_interval(),
    })
}

/// Wire the distribution pipeline against a signing gateway
pub async fn initialize_distribution(config: &AppConfig) -> AppResult<DistributionService> {
    info!("Initializing distribution components ...");
    config.validate()?;

    let private_key = config
        .private_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| AppError::Config("private_key is required to distribute".to_string()))?;

    let evm = evm_config(config)?;
    info!("⚙️  Connecting to {} (contract {:?})", evm.rpc_url, evm.contract_address);
    let gateway: Arc<dyn LedgerGateway> =
        Arc::new(EvmGateway::with_signer(evm, private_key, config.retry_policy()).await?);
    info!("✅ Ledger gateway ready");

    let settings = config.distribution_settings();
    info!("📋 Roster: {}", settings.roster_path.display());
    info!("📒 Records: {}", settings.records_path.display());
    info!(
        "⚙️  Batch size {}, {} attempts every {:?}, inclusion timeout {:?}",
        settings.batch_size,
        settings.retry.max_attempts,
        settings.retry.delay,
        settings.inclusion_timeout
    );
    info!(
        "⚙️  Vesting terms: offset {:?} blocks, cliff {} blocks, duration {} blocks",
        settings.terms.start_offset_blocks, settings.terms.cliff_blocks, settings.terms.duration_blocks
    );

    Ok(DistributionService::new(gateway, settings))
}

/// Wire the read-only inspector; no signer is needed
pub fn initialize_inspector(config: &AppConfig) -> AppResult<ScheduleInspector> {
    info!("Initializing schedule inspector ...");

    let evm = evm_config(config)?;
    info!("⚙️  Connecting to {} (contract {:?})", evm.rpc_url, evm.contract_address);
    let gateway: Arc<dyn LedgerGateway> = Arc::new(EvmGateway::read_only(evm)?);
    info!("✅ Read-only ledger gateway ready");

    Ok(ScheduleInspector::new(gateway, config.retry_policy()))
}
