// 8.0: liquidation engine. drives an under-collateralized account through
//   Healthy -> Liquidatable -> {Spread, Spot, Perp} -> PostCheck -> {Done, Socializable}
// against a liquidator and the insurance fund.
//
// the caller picks the mode and amount; the engine validates both against the
// account's actual per-group exposure, prices the transfer at a discount to
// oracle, caps liability buybacks at what the quote balance plus the fund can
// cover, enforces the no-over-liquidation post-condition, and finally decides
// whether the remaining wreckage can be socialized.

use crate::config::CoreConfig;
use crate::funding::PerpError;
use crate::health::{self, GroupDecomposition};
use crate::interest::SpotError;
use crate::pool::{BurnAmount, PoolError};
use crate::risk::{self, RiskParams};
use crate::state::{GroupError, HealthGroup, Ledgers, OraclePrices};
use crate::types::{
    div_to_zero, AccountId, HealthGroupId, HealthTier, LiquidationMode, ProductId,
    QUOTE_PRODUCT,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LiquidationError {
    #[error("account is not liquidatable: maintenance health {health}")]
    NotLiquidatable { health: Decimal },

    #[error("no {mode:?} leg to liquidate in this group")]
    NothingToLiquidate { mode: LiquidationMode },

    #[error("requested amount {requested} inconsistent with leg {leg}")]
    AmountOutOfBounds { requested: Decimal, leg: Decimal },

    #[error("liabilities can only be liquidated after spreads and perp assets are unwound")]
    OrderingViolation,

    #[error("liquidation would leave liquidatee with positive initial health {health}")]
    Overliquidated { health: Decimal },

    #[error("liquidator initial health {health} would be negative")]
    LiquidatorUnhealthy { health: Decimal },

    #[error("cannot liquidate own account")]
    SelfLiquidation,

    #[error("quote balance and insurance fund cannot cover any liquidation payment")]
    InsuranceExhausted,

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Spot(#[from] SpotError),

    #[error(transparent)]
    Perp(#[from] PerpError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Post-liability classification over every health group the account touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationStatus {
    /// Net-positive spot, spread assets, or perps with positive virtual quote
    /// remain: those must be liquidated away first.
    CannotLiquidateLiabilities,
    /// A residual spread liability remains; socialization would misprice it.
    CannotSocialize,
    /// Only flat or negative residue remains; losses may be socialized.
    CanSocialize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    pub mode: LiquidationMode,
    pub group: HealthGroupId,
    /// Signed amount actually liquidated, possibly capped below the request.
    pub amount: Decimal,
    /// Quote paid by the liquidator to the liquidatee (negative: paid by the
    /// liquidatee for a liability buyback).
    pub payment: Decimal,
    /// Shortfall drawn from the insurance fund.
    pub insurance_cover: Decimal,
    /// Fee paid by the liquidator into the insurance fund.
    pub fee: Decimal,
    pub status: Option<LiquidationStatus>,
    /// Loss spread across holders after the fund was exhausted.
    pub socialized: Decimal,
}

// 8.1: the single entry point. the caller (core) wraps this in a snapshot and
// discards all effects on any error.
#[allow(clippy::too_many_arguments)]
pub fn liquidate(
    ledgers: &mut Ledgers,
    prices: &OraclePrices,
    config: &CoreConfig,
    mode: LiquidationMode,
    group_id: HealthGroupId,
    liquidatee: AccountId,
    liquidator: AccountId,
    requested: Decimal,
) -> Result<LiquidationOutcome, LiquidationError> {
    if liquidatee == liquidator {
        return Err(LiquidationError::SelfLiquidation);
    }

    let maintenance =
        health::get_health(ledgers, prices, config, liquidatee, HealthTier::Maintenance);
    if maintenance >= Decimal::ZERO {
        return Err(LiquidationError::NotLiquidatable {
            health: maintenance,
        });
    }

    let group = *ledgers.groups.get(group_id)?;

    // LP holdings are decomposed back into their underlying legs before any
    // leg is measured
    if let Some(product) = group.spot {
        let burned = ledgers.pools.burn(product, liquidatee, BurnAmount::All)?;
        if !burned.shares.is_zero() {
            ledgers.spot.apply_delta(product, liquidatee, burned.base_out)?;
            ledgers
                .spot
                .apply_delta(QUOTE_PRODUCT, liquidatee, burned.quote_out)?;
        }
    }
    if let Some(product) = group.perp {
        let burned = ledgers.pools.burn(product, liquidatee, BurnAmount::All)?;
        if !burned.shares.is_zero() {
            ledgers
                .perp
                .apply_delta(product, liquidatee, burned.base_out, burned.quote_out)?;
        }
    }

    let decomposition = health::decompose(ledgers, prices, liquidatee, &group);
    let leg = validate_request(mode, &decomposition, requested)?;

    let pricing = price_leg(ledgers, config, mode, &decomposition, requested)?;
    let mut amount = requested;
    let mut payment = pricing.payment;

    // liability buyback: cap the amount so the post-payment quote balance,
    // topped up by the fund, lands at or above zero
    let mut insurance_cover = Decimal::ZERO;
    if leg < Decimal::ZERO && payment < Decimal::ZERO {
        let quote_balance = ledgers.spot.balance_real(QUOTE_PRODUCT, liquidatee);
        let shortfall = -(quote_balance + payment);
        if shortfall > Decimal::ZERO {
            let available = ledgers.insurance.balance();
            if shortfall <= available {
                insurance_cover = shortfall;
            } else {
                // scale down to the exact point where quote + fund cover the
                // bill, sweeping the rounding dust into the payment so the
                // quote balance lands at exactly zero
                let unit_cost = payment / amount; // positive
                let affordable = quote_balance + available;
                if affordable <= Decimal::ZERO || unit_cost <= Decimal::ZERO {
                    return Err(LiquidationError::InsuranceExhausted);
                }
                let capped_abs = div_to_zero(affordable, unit_cost);
                if capped_abs.is_zero() {
                    return Err(LiquidationError::InsuranceExhausted);
                }
                amount = -capped_abs;
                payment = -affordable;
                insurance_cover = available;
            }
            insurance_cover = ledgers.insurance.cover(insurance_cover);
        }
    }

    let improvement = pricing.fair_unit * amount - payment;
    let fee = improvement.max(Decimal::ZERO) * config.liquidation_fee_fraction;

    transfer_position(ledgers, mode, &group, liquidatee, liquidator, amount)?;
    ledgers
        .spot
        .apply_delta(QUOTE_PRODUCT, liquidatee, payment + insurance_cover)?;
    ledgers
        .spot
        .apply_delta(QUOTE_PRODUCT, liquidator, -payment - fee)?;
    ledgers.insurance.accrue_fee(fee);

    // post-conditions: no over-liquidation, and the liquidator must be able
    // to carry what they took
    let liquidatee_health =
        health::get_health(ledgers, prices, config, liquidatee, HealthTier::Initial);
    if liquidatee_health > Decimal::ZERO {
        return Err(LiquidationError::Overliquidated {
            health: liquidatee_health,
        });
    }
    let liquidator_health =
        health::get_health(ledgers, prices, config, liquidator, HealthTier::Initial);
    if liquidator_health < Decimal::ZERO {
        return Err(LiquidationError::LiquidatorUnhealthy {
            health: liquidator_health,
        });
    }

    let mut status = None;
    let mut socialized = Decimal::ZERO;
    if leg < Decimal::ZERO {
        let derived = derive_status(ledgers, prices, liquidatee);
        if derived == LiquidationStatus::CanSocialize {
            socialized = socialize(ledgers, prices, liquidatee)?;
        }
        status = Some(derived);
    }

    Ok(LiquidationOutcome {
        mode,
        group: group_id,
        amount,
        payment,
        insurance_cover,
        fee,
        status,
        socialized,
    })
}

// 8.2: mode/leg validation. the request must point at a real leg, carry its
// sign, stay inside its magnitude, and respect the liability ordering.
fn validate_request(
    mode: LiquidationMode,
    decomposition: &GroupDecomposition,
    requested: Decimal,
) -> Result<Decimal, LiquidationError> {
    let leg = match mode {
        LiquidationMode::Spread => decomposition.basis,
        LiquidationMode::Spot => decomposition.spot_residual(),
        LiquidationMode::Perp => decomposition.perp_residual(),
    };
    if leg.is_zero() {
        return Err(LiquidationError::NothingToLiquidate { mode });
    }
    let same_sign = (requested > Decimal::ZERO) == (leg > Decimal::ZERO);
    if requested.is_zero() || !same_sign || requested.abs() > leg.abs() {
        return Err(LiquidationError::AmountOutOfBounds { requested, leg });
    }

    // a spot or perp liability cannot be bought back while the group still
    // carries a spread, and spot liabilities wait for perp assets to unwind
    if requested < Decimal::ZERO && mode != LiquidationMode::Spread {
        if !decomposition.basis.is_zero() {
            return Err(LiquidationError::OrderingViolation);
        }
        if mode == LiquidationMode::Spot && decomposition.perp_residual() > Decimal::ZERO {
            return Err(LiquidationError::OrderingViolation);
        }
    }

    Ok(leg)
}

struct LegPricing {
    /// Oracle value per unit of the liquidated amount.
    fair_unit: Decimal,
    payment: Decimal,
}

// 8.3: liquidation pricing. assets are bought at a discount and liabilities
// sold back at a premium of half the maintenance weight gap; spread packages
// use half the spread penalty instead.
fn price_leg(
    ledgers: &Ledgers,
    config: &CoreConfig,
    mode: LiquidationMode,
    decomposition: &GroupDecomposition,
    amount: Decimal,
) -> Result<LegPricing, LiquidationError> {
    match mode {
        LiquidationMode::Spot | LiquidationMode::Perp => {
            let (product, price) = if mode == LiquidationMode::Spot {
                (decomposition.group.spot, decomposition.spot_price)
            } else {
                (decomposition.group.perp, decomposition.perp_price)
            };
            let risk_params = risk_params(ledgers, product)?;
            let weight = risk::weight(risk_params, amount, HealthTier::Maintenance);
            let liq_price = if amount > Decimal::ZERO {
                price * (Decimal::ONE - (Decimal::ONE - weight) / dec!(2))
            } else {
                price * (Decimal::ONE + (weight - Decimal::ONE) / dec!(2))
            };
            Ok(LegPricing {
                fair_unit: price,
                payment: amount * liq_price,
            })
        }
        LiquidationMode::Spread => {
            let spot_risk = risk_params(ledgers, decomposition.group.spot)?;
            let perp_risk = risk_params(ledgers, decomposition.group.perp)?;
            let fair_unit = decomposition.spot_price - decomposition.perp_price;
            let penalty = risk::spread_penalty(
                spot_risk,
                perp_risk,
                amount.abs(),
                decomposition.spot_price,
                HealthTier::Maintenance,
                config.spread_discount_factor,
            );
            Ok(LegPricing {
                fair_unit,
                payment: amount * fair_unit - penalty / dec!(2),
            })
        }
    }
}

fn risk_params(
    ledgers: &Ledgers,
    product: Option<ProductId>,
) -> Result<&RiskParams, LiquidationError> {
    let product = product.ok_or(LiquidationError::OrderingViolation)?;
    ledgers
        .product(product)
        .map(|c| &c.risk)
        .ok_or(LiquidationError::Spot(SpotError::ProductNotFound(product)))
}

fn transfer_position(
    ledgers: &mut Ledgers,
    mode: LiquidationMode,
    group: &HealthGroup,
    liquidatee: AccountId,
    liquidator: AccountId,
    amount: Decimal,
) -> Result<(), LiquidationError> {
    if matches!(mode, LiquidationMode::Spot | LiquidationMode::Spread) {
        let product = group.spot.ok_or(LiquidationError::OrderingViolation)?;
        ledgers.spot.apply_delta(product, liquidatee, -amount)?;
        ledgers.spot.apply_delta(product, liquidator, amount)?;
    }
    if matches!(mode, LiquidationMode::Perp | LiquidationMode::Spread) {
        let product = group.perp.ok_or(LiquidationError::OrderingViolation)?;
        // spread mode moves the offsetting perp leg, plain perp mode the leg itself
        let perp_amount = if mode == LiquidationMode::Spread {
            -amount
        } else {
            amount
        };
        ledgers
            .perp
            .apply_delta(product, liquidatee, -perp_amount, Decimal::ZERO)?;
        ledgers
            .perp
            .apply_delta(product, liquidator, perp_amount, Decimal::ZERO)?;
    }
    Ok(())
}

// 8.4: liquidation status over every group. a write-off waits until nothing
// of positive value is left: long spot residue, a spread asset, a perp
// position still backed by positive virtual quote, or cash in excess of the
// account's virtual-quote debts (cash still funds buybacks; the capped
// buyback drains it to exactly zero). a residual spread liability blocks
// socialization outright, since the index shift would misprice it.
pub fn derive_status(
    ledgers: &Ledgers,
    prices: &OraclePrices,
    account: AccountId,
) -> LiquidationStatus {
    let mut has_spread_liability = false;
    let mut cash = ledgers.spot.balance_real(QUOTE_PRODUCT, account);

    for (_, group) in ledgers.groups.iter() {
        let d = health::decompose(ledgers, prices, account, group);
        if d.spot_residual() > Decimal::ZERO || d.basis > Decimal::ZERO {
            return LiquidationStatus::CannotLiquidateLiabilities;
        }
        if !d.perp_residual().is_zero() && d.perp_v_quote > Decimal::ZERO {
            return LiquidationStatus::CannotLiquidateLiabilities;
        }
        cash += d.perp_v_quote;
        if d.basis < Decimal::ZERO {
            has_spread_liability = true;
        }
    }

    if cash > Decimal::ZERO {
        return LiquidationStatus::CannotLiquidateLiabilities;
    }
    if has_spread_liability {
        LiquidationStatus::CannotSocialize
    } else {
        LiquidationStatus::CanSocialize
    }
}

// 8.5: socialization. perp losses are spread through the funding indices,
// residual spot liabilities across the product's depositors, and quote
// deficits through the insurance fund first and the deposit multiplier
// second. returns the total quote value spread across holders.
fn socialize(
    ledgers: &mut Ledgers,
    prices: &OraclePrices,
    account: AccountId,
) -> Result<Decimal, LiquidationError> {
    let mut socialized = Decimal::ZERO;

    let perp_products: Vec<ProductId> = ledgers
        .groups
        .iter()
        .filter_map(|(_, g)| g.perp)
        .collect();
    for product in perp_products {
        let balance = ledgers.perp.balance(product, account);
        if balance.v_quote_balance >= Decimal::ZERO {
            continue;
        }
        // the account's own cash settles the deficit before the book does
        let quote_balance = ledgers.spot.balance_real(QUOTE_PRODUCT, account);
        let offset = quote_balance
            .max(Decimal::ZERO)
            .min(-balance.v_quote_balance);
        if !offset.is_zero() {
            ledgers
                .perp
                .apply_delta(product, account, Decimal::ZERO, offset)?;
            ledgers.spot.apply_delta(QUOTE_PRODUCT, account, -offset)?;
        }
        let loss = -(balance.v_quote_balance + offset);
        if loss > Decimal::ZERO {
            let absorbed = ledgers.perp.socialize_loss(product, loss)?;
            if !absorbed.is_zero() {
                ledgers
                    .perp
                    .apply_delta(product, account, Decimal::ZERO, absorbed)?;
                socialized += absorbed;
            }
        }
    }

    let spot_products: Vec<ProductId> = ledgers
        .groups
        .iter()
        .filter_map(|(_, g)| g.spot)
        .collect();
    for product in spot_products {
        let balance = ledgers.spot.balance_real(product, account);
        if balance < Decimal::ZERO {
            let loss = -balance;
            ledgers.spot.socialize_loss(product, loss)?;
            ledgers.spot.apply_delta(product, account, loss)?;
            socialized += loss * prices.get(product);
        }
    }

    let quote_balance = ledgers.spot.balance_real(QUOTE_PRODUCT, account);
    if quote_balance < Decimal::ZERO {
        let loss = -quote_balance;
        let covered = ledgers.insurance.cover(loss);
        ledgers.spot.apply_delta(QUOTE_PRODUCT, account, covered)?;
        let remainder = loss - covered;
        if remainder > Decimal::ZERO {
            ledgers.spot.socialize_loss(QUOTE_PRODUCT, remainder)?;
            ledgers
                .spot
                .apply_delta(QUOTE_PRODUCT, account, remainder)?;
            socialized += remainder;
        }
    }

    Ok(socialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::InterestParams;
    use crate::state::ProductConfig;
    use crate::types::{ProductKind, Timestamp};
    use rust_decimal_macros::dec;

    const SPOT: ProductId = ProductId(1);
    const PERP: ProductId = ProductId(2);
    const ALICE: AccountId = AccountId(10);

    fn risk_params() -> RiskParams {
        RiskParams {
            long_weight_initial: dec!(0.9),
            short_weight_initial: dec!(1.1),
            long_weight_maintenance: dec!(0.95),
            short_weight_maintenance: dec!(1.05),
            large_position_penalty: Decimal::ZERO,
            large_position_threshold: Decimal::ZERO,
        }
    }

    fn ledgers_with_group() -> (Ledgers, OraclePrices) {
        let now = Timestamp::from_secs(0);
        let mut ledgers = Ledgers::new();
        ledgers.products.insert(
            QUOTE_PRODUCT,
            ProductConfig {
                kind: ProductKind::Spot,
                risk: RiskParams::face_value(),
            },
        );
        ledgers
            .spot
            .add_product(QUOTE_PRODUCT, InterestParams::default(), now)
            .unwrap();
        ledgers.products.insert(
            SPOT,
            ProductConfig {
                kind: ProductKind::Spot,
                risk: risk_params(),
            },
        );
        ledgers
            .spot
            .add_product(SPOT, InterestParams::default(), now)
            .unwrap();
        ledgers.products.insert(
            PERP,
            ProductConfig {
                kind: ProductKind::Perp,
                risk: risk_params(),
            },
        );
        ledgers.perp.add_product(PERP, now).unwrap();
        ledgers
            .groups
            .add(HealthGroup {
                spot: Some(SPOT),
                perp: Some(PERP),
            })
            .unwrap();

        let mut prices = OraclePrices::default();
        prices.set(SPOT, dec!(10));
        prices.set(PERP, dec!(10));
        (ledgers, prices)
    }

    fn decomposition(spot: Decimal, perp: Decimal, basis: Decimal) -> GroupDecomposition {
        GroupDecomposition {
            group: HealthGroup {
                spot: Some(ProductId(1)),
                perp: Some(ProductId(2)),
            },
            spot_amount: spot,
            perp_amount: perp,
            spot_price: dec!(10),
            perp_price: dec!(10),
            basis,
            perp_v_quote: Decimal::ZERO,
            lp_quote: Decimal::ZERO,
        }
    }

    #[test]
    fn request_must_carry_the_leg_sign_and_bound() {
        let d = decomposition(dec!(-100), Decimal::ZERO, Decimal::ZERO);

        assert!(validate_request(LiquidationMode::Spot, &d, dec!(-40)).is_ok());
        assert!(matches!(
            validate_request(LiquidationMode::Spot, &d, dec!(40)),
            Err(LiquidationError::AmountOutOfBounds { .. })
        ));
        assert!(matches!(
            validate_request(LiquidationMode::Spot, &d, dec!(-150)),
            Err(LiquidationError::AmountOutOfBounds { .. })
        ));
        assert!(matches!(
            validate_request(LiquidationMode::Spot, &d, Decimal::ZERO),
            Err(LiquidationError::AmountOutOfBounds { .. })
        ));
        assert!(matches!(
            validate_request(LiquidationMode::Perp, &d, dec!(-1)),
            Err(LiquidationError::NothingToLiquidate { .. })
        ));
    }

    #[test]
    fn liability_blocked_while_spread_or_perp_asset_remains() {
        // short spot partially hedged: basis -30, residual -70
        let spread = decomposition(dec!(-100), dec!(30), dec!(-30));
        assert!(matches!(
            validate_request(LiquidationMode::Spot, &spread, dec!(-10)),
            Err(LiquidationError::OrderingViolation)
        ));

        // no spread, but a perp asset still open
        let perp_asset = decomposition(dec!(-100), dec!(30), Decimal::ZERO);
        assert!(matches!(
            validate_request(LiquidationMode::Spot, &perp_asset, dec!(-10)),
            Err(LiquidationError::OrderingViolation)
        ));

        // perp liabilities only wait for the spread
        let perp_liability = decomposition(Decimal::ZERO, dec!(-50), Decimal::ZERO);
        assert!(validate_request(LiquidationMode::Perp, &perp_liability, dec!(-50)).is_ok());
    }

    #[test]
    fn write_off_gated_on_the_sign_of_the_residue() {
        let (mut ledgers, prices) = ledgers_with_group();

        // a bare residual liability is exactly what socialization resolves
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(-7)).unwrap();
        assert_eq!(
            derive_status(&ledgers, &prices, ALICE),
            LiquidationStatus::CanSocialize
        );

        // flip to a long residual: an asset remains to liquidate first
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(12)).unwrap();
        assert_eq!(
            derive_status(&ledgers, &prices, ALICE),
            LiquidationStatus::CannotLiquidateLiabilities
        );
    }

    #[test]
    fn positive_v_quote_behind_an_open_perp_blocks_the_write_off() {
        let (mut ledgers, prices) = ledgers_with_group();
        ledgers.perp.apply_delta(PERP, ALICE, dec!(3), dec!(40)).unwrap();
        assert_eq!(
            derive_status(&ledgers, &prices, ALICE),
            LiquidationStatus::CannotLiquidateLiabilities
        );

        // the same position under water no longer blocks it
        ledgers
            .perp
            .apply_delta(PERP, ALICE, Decimal::ZERO, dec!(-90))
            .unwrap();
        assert_eq!(
            derive_status(&ledgers, &prices, ALICE),
            LiquidationStatus::CanSocialize
        );
    }

    #[test]
    fn cash_on_hand_blocks_the_write_off() {
        let (mut ledgers, prices) = ledgers_with_group();
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(-7)).unwrap();
        ledgers
            .spot
            .apply_delta(QUOTE_PRODUCT, ALICE, dec!(100))
            .unwrap();
        assert_eq!(
            derive_status(&ledgers, &prices, ALICE),
            LiquidationStatus::CannotLiquidateLiabilities
        );

        // cash owed to a virtual-quote debt no longer counts
        ledgers
            .perp
            .apply_delta(PERP, ALICE, Decimal::ZERO, dec!(-100))
            .unwrap();
        assert_eq!(
            derive_status(&ledgers, &prices, ALICE),
            LiquidationStatus::CanSocialize
        );
    }

    #[test]
    fn residual_spread_liability_blocks_socialization_only() {
        let (mut ledgers, prices) = ledgers_with_group();
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(-5)).unwrap();
        ledgers
            .perp
            .apply_delta(PERP, ALICE, dec!(5), dec!(-50))
            .unwrap();
        assert_eq!(
            derive_status(&ledgers, &prices, ALICE),
            LiquidationStatus::CannotSocialize
        );
    }

    #[test]
    fn spread_request_targets_the_basis() {
        let d = decomposition(dec!(80), dec!(-50), dec!(50));
        assert_eq!(
            validate_request(LiquidationMode::Spread, &d, dec!(50)).unwrap(),
            dec!(50)
        );
        assert!(matches!(
            validate_request(LiquidationMode::Spread, &d, dec!(60)),
            Err(LiquidationError::AmountOutOfBounds { .. })
        ));
    }
}
