// Schedule inspector - read-only view of on-chain vesting schedules.

use ethers::types::{U256, U512};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    gateway::{LedgerGateway, VestingSchedule},
    retry::{run_with_retry, RetryPolicy},
    roster::validate_address,
};

const BASIS_POINTS: u64 = 10_000;

/// Per-address inspection result. Failures land in `error`, never abort the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    pub address: String,
    pub exists: bool,
    pub total_amount: Option<String>,
    pub released_amount: Option<String>,
    pub start_block: Option<u64>,
    pub duration_blocks: Option<u64>,
    pub cliff_block: Option<u64>,
    pub end_block: Option<u64>,
    pub vested_percentage: Option<String>,
    pub error: Option<String>,
}

impl ScheduleReport {
    fn absent(address: &str) -> Self {
        Self {
            address: address.to_string(),
            exists: false,
            total_amount: None,
            released_amount: None,
            start_block: None,
            duration_blocks: None,
            cliff_block: None,
            end_block: None,
            vested_percentage: None,
            error: None,
        }
    }

    fn failed(address: &str, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::absent(address)
        }
    }

    fn from_schedule(address: &str, schedule: &VestingSchedule) -> Self {
        if !schedule.exists() {
            return Self::absent(address);
        }

        Self {
            address: address.to_string(),
            exists: true,
            total_amount: Some(schedule.total_amount.to_string()),
            released_amount: Some(schedule.released_amount.to_string()),
            start_block: Some(schedule.start_block),
            duration_blocks: Some(schedule.duration_blocks),
            cliff_block: Some(schedule.cliff_block),
            end_block: Some(schedule.end_block()),
            vested_percentage: vested_percentage(schedule.total_amount, schedule.released_amount),
            error: None,
        }
    }
}

/// `released / total * 100`, two decimals, e.g. `"25.00%"`.
///
/// `None` when `total` is zero: that means no schedule, not a division.
pub fn vested_percentage(total: U256, released: U256) -> Option<String> {
    if total.is_zero() {
        return None;
    }

    let total = U512::from(total);
    let scaled = released.full_mul(U256::from(BASIS_POINTS)) + total / 2;
    let bps = scaled / total;
    let bps = if bps > U512::from(u64::MAX) {
        u64::MAX
    } else {
        bps.low_u64()
    };

    Some(format!("{}%", Decimal::from_i128_with_scale(bps as i128, 2)))
}

pub struct ScheduleInspector {
    gateway: Arc<dyn LedgerGateway>,
    retry: RetryPolicy,
}

impl ScheduleInspector {
    pub fn new(gateway: Arc<dyn LedgerGateway>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    #[instrument(skip(self))]
    pub async fn inspect(&self, address: &str) -> ScheduleReport {
        let beneficiary = match validate_address(address) {
            Ok(beneficiary) => beneficiary,
            Err(e) => {
                warn!("❌ {}", e);
                return ScheduleReport::failed(address, e.to_string());
            }
        };

        let gateway = self.gateway.as_ref();
        match run_with_retry("read_schedule", self.retry, move || {
            gateway.read_schedule(beneficiary)
        })
        .await
        {
            Ok(schedule) => ScheduleReport::from_schedule(address, &schedule),
            Err(e) => {
                warn!("❌ Could not read schedule: {}", e);
                ScheduleReport::failed(address, e.to_string())
            }
        }
    }

    /// Inspect `addresses` one after another
    pub async fn inspect_all(&self, addresses: &[String]) -> Vec<ScheduleReport> {
        info!("🔍 Inspecting {} addresses", addresses.len());

        let mut reports = Vec::with_capacity(addresses.len());
        for address in addresses {
            reports.push(self.inspect(address.trim()).await);
        }

        let found = reports.iter().filter(|r| r.exists).count();
        let errors = reports.iter().filter(|r| r.error.is_some()).count();
        info!(
            "📊 {} with schedules, {} without, {} errors",
            found,
            reports.len() - found - errors,
            errors
        );

        reports
    }
}

/// Console table: address, existence, amount, vested percentage, error
pub fn render_table(reports: &[ScheduleReport]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<44} {:<7} {:>28} {:>9}  {}",
        "ADDRESS", "EXISTS", "TOTAL", "VESTED", "ERROR"
    );

    for report in reports {
        let _ = writeln!(
            out,
            "{:<44} {:<7} {:>28} {:>9}  {}",
            report.address,
            if report.exists { "yes" } else { "no" },
            report.total_amount.as_deref().unwrap_or("-"),
            report.vested_percentage.as_deref().unwrap_or("-"),
            report.error.as_deref().unwrap_or("")
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use ethers::types::Address;
    use std::time::Duration;

    fn wallet(n: u64) -> String {
        format!("{:#x}", Address::from_low_u64_be(n))
    }

    fn inspector(gateway: MockGateway) -> ScheduleInspector {
        ScheduleInspector::new(Arc::new(gateway), RetryPolicy::new(2, Duration::from_millis(1)))
    }

    #[test]
    fn test_vested_percentage() {
        assert_eq!(
            vested_percentage(U256::from(10_000), U256::from(2_500)).as_deref(),
            Some("25.00%")
        );
        assert_eq!(
            vested_percentage(U256::from(3), U256::from(2)).as_deref(),
            Some("66.67%")
        );
        assert_eq!(
            vested_percentage(U256::from(5), U256::zero()).as_deref(),
            Some("0.00%")
        );
        assert_eq!(
            vested_percentage(U256::from(7), U256::from(7)).as_deref(),
            Some("100.00%")
        );
        assert_eq!(vested_percentage(U256::zero(), U256::from(5)), None);
    }

    #[test]
    fn test_vested_percentage_handles_huge_amounts() {
        assert_eq!(
            vested_percentage(U256::MAX, U256::MAX / 2).as_deref(),
            Some("50.00%")
        );
    }

    #[tokio::test]
    async fn test_reports_existing_schedule() {
        let address = Address::from_low_u64_be(1);
        let report = inspector(MockGateway::new(0).with_schedule(address, 10_000, 2_500))
            .inspect(&wallet(1))
            .await;

        assert!(report.exists);
        assert_eq!(report.total_amount.as_deref(), Some("10000"));
        assert_eq!(report.end_block, Some(1_100));
        assert_eq!(report.vested_percentage.as_deref(), Some("25.00%"));
        assert_eq!(report.error, None);
    }

    #[tokio::test]
    async fn test_zero_total_is_absent() {
        let report = inspector(MockGateway::new(0)).inspect(&wallet(1)).await;
        assert!(!report.exists);
        assert_eq!(report.vested_percentage, None);
        assert_eq!(report.error, None);
    }

    #[tokio::test]
    async fn test_per_address_failures_do_not_abort() {
        let address = Address::from_low_u64_be(2);
        // both attempts for the first valid address fail
        let gateway = MockGateway::new(0)
            .with_schedule(address, 100, 0)
            .fail_reads(2);
        let inspector = inspector(gateway);

        let reports = inspector
            .inspect_all(&["nope".to_string(), wallet(1), wallet(2)])
            .await;

        assert_eq!(reports.len(), 3);
        assert!(reports[0].error.as_deref().unwrap().contains("Invalid address"));
        assert!(reports[1].error.as_deref().unwrap().contains("RetryExhausted"));
        assert!(reports[2].exists);
        assert!(reports.iter().take(2).all(|r| !r.exists));

        let table = render_table(&reports);
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("0.00%"));
    }
}
