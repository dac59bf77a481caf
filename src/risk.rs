// 2.0: risk model. pure functions, no state. position-size-dependent collateral
// weight curves plus the spread discount for hedged basis positions.
//
// weights are fractions of oracle value an asset counts for (longs, < 1) or a
// liability costs (shorts, > 1). initial weights are always at least as strict
// as maintenance weights; that ordering is enforced at configuration time and
// never re-checked at runtime.

use crate::types::{HealthTier, UNSUPPORTED_WEIGHT};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParams {
    pub long_weight_initial: Decimal,
    pub short_weight_initial: Decimal,
    pub long_weight_maintenance: Decimal,
    pub short_weight_maintenance: Decimal,
    /// Extra weight per unit of size beyond the threshold, scaled by the
    /// excess over the threshold. Zero disables the large-position curve.
    pub large_position_penalty: Decimal,
    /// Position size above which the large-position penalty kicks in.
    pub large_position_threshold: Decimal,
}

impl RiskParams {
    /// Weights for the quote product and anything else counted at face value.
    pub fn face_value() -> Self {
        Self {
            long_weight_initial: Decimal::ONE,
            short_weight_initial: Decimal::ONE,
            long_weight_maintenance: Decimal::ONE,
            short_weight_maintenance: Decimal::ONE,
            large_position_penalty: Decimal::ZERO,
            large_position_threshold: Decimal::ZERO,
        }
    }

    /// Initial requirements must be at least as strict as maintenance:
    /// long weights ordered up, short weights ordered down.
    pub fn validate(&self) -> Result<(), RiskConfigError> {
        if self.long_weight_initial > self.long_weight_maintenance {
            return Err(RiskConfigError::LongWeightOrdering {
                initial: self.long_weight_initial,
                maintenance: self.long_weight_maintenance,
            });
        }
        if self.short_weight_initial < self.short_weight_maintenance {
            return Err(RiskConfigError::ShortWeightOrdering {
                initial: self.short_weight_initial,
                maintenance: self.short_weight_maintenance,
            });
        }
        if self.large_position_penalty < Decimal::ZERO
            || self.large_position_threshold < Decimal::ZERO
        {
            return Err(RiskConfigError::NegativePenalty);
        }
        Ok(())
    }

    fn long_weight(&self, tier: HealthTier) -> Decimal {
        match tier {
            HealthTier::Initial => self.long_weight_initial,
            // settlement eligibility is judged against maintenance weights
            HealthTier::Maintenance | HealthTier::SettlementPnl => self.long_weight_maintenance,
        }
    }

    fn short_weight(&self, tier: HealthTier) -> Decimal {
        match tier {
            HealthTier::Initial => self.short_weight_initial,
            HealthTier::Maintenance | HealthTier::SettlementPnl => self.short_weight_maintenance,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RiskConfigError {
    #[error("long weight initial {initial} exceeds maintenance {maintenance}")]
    LongWeightOrdering { initial: Decimal, maintenance: Decimal },

    #[error("short weight initial {initial} below maintenance {maintenance}")]
    ShortWeightOrdering { initial: Decimal, maintenance: Decimal },

    #[error("large position penalty parameters must be non-negative")]
    NegativePenalty,
}

// 2.1: the weight curve. sign of the amount picks the long or short weight;
// sizes beyond the threshold are penalized linearly in the excess so larger
// positions always face an equal or worse weight.
pub fn weight(risk: &RiskParams, amount: Decimal, tier: HealthTier) -> Decimal {
    if amount.is_zero() {
        return Decimal::ONE;
    }

    let base = if amount > Decimal::ZERO {
        risk.long_weight(tier)
    } else {
        risk.short_weight(tier)
    };

    // sentinel passes through untouched; the health engine turns it into
    // INVALID_HEALTH for the whole account.
    if base == UNSUPPORTED_WEIGHT {
        return UNSUPPORTED_WEIGHT;
    }

    let abs = amount.abs();
    if risk.large_position_penalty.is_zero()
        || risk.large_position_threshold.is_zero()
        || abs <= risk.large_position_threshold
    {
        return base;
    }

    let excess = abs - risk.large_position_threshold;
    let adjustment = risk.large_position_penalty * excess / risk.large_position_threshold;

    if amount > Decimal::ZERO {
        (base - adjustment).max(Decimal::ZERO)
    } else {
        base + adjustment
    }
}

// 2.2: spread discount. a long-spot/short-perp (or inverse) basis position is
// priced at the midpoint of each leg's own single-leg penalty, divided by the
// spread discount factor. takes the overlap in base units plus the price so
// the large-position curve sees the same scale as the single-leg paths;
// returns a quote-denominated penalty value.
pub fn spread_penalty(
    spot_risk: &RiskParams,
    perp_risk: &RiskParams,
    base_abs: Decimal,
    price: Decimal,
    tier: HealthTier,
    spread_discount_factor: Decimal,
) -> Decimal {
    if base_abs.is_zero() || price.is_zero() {
        return Decimal::ZERO;
    }
    let notional = base_abs * price;

    let long_leg = (Decimal::ONE - weight(spot_risk, base_abs, tier)) * notional;
    let short_leg = (weight(perp_risk, -base_abs, tier) - Decimal::ONE) * notional;

    (long_leg + short_leg) / dec!(2) / spread_discount_factor
}
