// 1.0: all the primitives live here. nothing in the core works without these types.
// IDs, timestamps, health tiers, sentinel values. each id is a newtype so the
// compiler catches type mixups between products, accounts and health groups.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub u32);

// opaque fixed-width account identifier. the core never looks inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealthGroupId(pub u32);

// external collaborators (matching engine, custody frontends) that are
// allowed to push balance deltas and drive the AMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollaboratorId(pub u32);

// the quote product is a spot product fixed at id 0. everything settles into it.
pub const QUOTE_PRODUCT: ProductId = ProductId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    Spot,
    Perp,
}

// 1.1: health tiers. Initial gates new risk (strictest weights), Maintenance
// triggers liquidation, SettlementPnl gates realized-pnl settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthTier {
    Initial,
    Maintenance,
    SettlementPnl,
}

// which leg of a health group a liquidation call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationMode {
    Spread,
    Spot,
    Perp,
}

// health reported when any leg sits outside the risk system. callers must
// treat it as an immediate rejection, never as a comparable value.
pub const INVALID_HEALTH: Decimal = Decimal::MIN;

// weight configured for a product outside the risk system (e.g. an unbacked
// short). propagates to INVALID_HEALTH.
pub const UNSUPPORTED_WEIGHT: Decimal = Decimal::MAX;

// 1.2: second-resolution timestamp. tick deltas are computed in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    pub fn elapsed_secs(&self, later: &Timestamp) -> i64 {
        later.0 - self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

// 1.3: fixed-point helpers. all ledger normalization divisions round toward
// zero so deposits are never overstated and borrows never understated.
pub const DECIMAL_SCALE: u32 = 18;

pub const SECONDS_PER_YEAR: Decimal = dec!(31_536_000);

pub fn div_to_zero(numerator: Decimal, denominator: Decimal) -> Decimal {
    (numerator / denominator).round_dp_with_strategy(DECIMAL_SCALE, RoundingStrategy::ToZero)
}

pub fn clamp(value: Decimal, low: Decimal, high: Decimal) -> Decimal {
    value.max(low).min(high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn timestamp_elapsed() {
        let t0 = Timestamp::from_secs(100);
        let t1 = Timestamp::from_secs(700);
        assert_eq!(t0.elapsed_secs(&t1), 600);
        assert_eq!(t1.elapsed_secs(&t0), -600);
    }

    #[test]
    fn division_rounds_toward_zero() {
        let pos = div_to_zero(dec!(1), dec!(3));
        assert_eq!(pos, dec!(0.333333333333333333));

        let neg = div_to_zero(dec!(-1), dec!(3));
        assert_eq!(neg, dec!(-0.333333333333333333));
        // toward zero, not toward negative infinity
        assert_eq!(neg, -pos);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(dec!(5), dec!(-1), dec!(1)), dec!(1));
        assert_eq!(clamp(dec!(-5), dec!(-1), dec!(1)), dec!(-1));
        assert_eq!(clamp(dec!(0.5), dec!(-1), dec!(1)), dec!(0.5));
    }

    #[test]
    fn sentinels_are_extreme() {
        assert!(INVALID_HEALTH < dec!(-1_000_000_000));
        assert!(UNSUPPORTED_WEIGHT > dec!(1_000_000_000));
    }
}
