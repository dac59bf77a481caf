//! Core-wide configuration.
//!
//! Everything the clearing core needs that is not per-product: fee fractions,
//! the funding/interest clock bounds, the spread discount, and the audit log
//! size. Per-product risk and interest parameters are supplied when the
//! product is created.

use crate::types::AccountId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Divisor applied to the midpoint single-leg penalty of a basis position.
    /// A hedged spread carries materially less tail risk than its legs.
    pub spread_discount_factor: Decimal,
    /// Fraction of the liquidator's price improvement paid into the insurance fund.
    pub liquidation_fee_fraction: Decimal,
    /// Fraction of accrued borrow interest skimmed to the fees account.
    pub protocol_fee_fraction: Decimal,
    /// Account credited with the protocol fee skim.
    pub fees_account: AccountId,
    /// Largest accepted gap between ticks, in seconds. Larger gaps are stale.
    pub max_tick_gap_secs: i64,
    /// Perpetual funding period in seconds.
    pub funding_period_secs: Decimal,
    /// Mark price EMA time constant in seconds.
    pub ema_tau_secs: Decimal,
    /// Funding payment clamp, as a fraction of the oracle price.
    pub max_price_diff_fraction: Decimal,
    /// Audit event ring size.
    pub max_events: usize,
    /// Print events as they are emitted.
    pub verbose: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            spread_discount_factor: dec!(5),
            liquidation_fee_fraction: dec!(0.25),
            protocol_fee_fraction: dec!(0.2),
            fees_account: AccountId(0),
            max_tick_gap_secs: 7 * 24 * 3600,
            funding_period_secs: dec!(28_800), // 8 hours
            ema_tau_secs: dec!(600),
            max_price_diff_fraction: dec!(0.1),
            max_events: 10_000,
            verbose: false,
        }
    }
}
