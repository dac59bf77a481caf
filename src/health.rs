// 7.0: health engine. folds every position an account holds — spot balances,
// perp positions, pro-rata AMM shares — into one signed number per tier.
// negative health at a tier means under-collateralized for that tier.
//
// the spread rule: when a group holds offsetting spot and perp exposure, the
// overlapping "basis" amount is carved out of both legs, credited at full
// value, and discounted once with the spread penalty instead of twice with
// the single-leg weights.

use crate::config::CoreConfig;
use crate::risk::{self, RiskParams};
use crate::state::{HealthGroup, Ledgers, OraclePrices};
use crate::types::{
    AccountId, HealthTier, ProductId, INVALID_HEALTH, QUOTE_PRODUCT, UNSUPPORTED_WEIGHT,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One health group's positions, measured for one account. Amounts include
/// the account's pro-rata share of AMM reserves held through LP shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDecomposition {
    pub group: HealthGroup,
    pub spot_amount: Decimal,
    pub perp_amount: Decimal,
    pub spot_price: Decimal,
    pub perp_price: Decimal,
    /// Overlap between a long leg and a short leg, signed like the spot leg.
    pub basis: Decimal,
    /// Perp virtual quote with outstanding funding folded in.
    pub perp_v_quote: Decimal,
    /// Pro-rata quote reserves across the group's pools.
    pub lp_quote: Decimal,
}

impl GroupDecomposition {
    pub fn spot_residual(&self) -> Decimal {
        self.spot_amount - self.basis
    }

    pub fn perp_residual(&self) -> Decimal {
        self.perp_amount + self.basis
    }
}

/// Read-only single-product risk view for external callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreRisk {
    pub amount: Decimal,
    pub price: Decimal,
    pub weight: Decimal,
}

// 7.1: per-group measurement.
pub fn decompose(
    ledgers: &Ledgers,
    prices: &OraclePrices,
    account: AccountId,
    group: &HealthGroup,
) -> GroupDecomposition {
    let mut lp_quote = Decimal::ZERO;

    let (spot_amount, spot_price) = match group.spot {
        Some(product) => {
            let (lp_base, lp_q) = ledgers.pools.pro_rata(product, account);
            lp_quote += lp_q;
            (
                ledgers.spot.balance_real(product, account) + lp_base,
                prices.get(product),
            )
        }
        None => (Decimal::ZERO, Decimal::ZERO),
    };

    let (perp_amount, perp_v_quote, perp_price) = match group.perp {
        Some(product) => {
            let balance = ledgers.perp.balance(product, account);
            let (lp_base, lp_q) = ledgers.pools.pro_rata(product, account);
            lp_quote += lp_q;
            (
                balance.amount + lp_base,
                balance.v_quote_balance,
                prices.get(product),
            )
        }
        None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
    };

    let basis = if spot_amount > Decimal::ZERO && perp_amount < Decimal::ZERO {
        spot_amount.min(-perp_amount)
    } else if spot_amount < Decimal::ZERO && perp_amount > Decimal::ZERO {
        spot_amount.max(-perp_amount)
    } else {
        Decimal::ZERO
    };

    GroupDecomposition {
        group: *group,
        spot_amount,
        perp_amount,
        spot_price,
        perp_price,
        basis,
        perp_v_quote,
        lp_quote,
    }
}

fn risk_of(ledgers: &Ledgers, product: Option<ProductId>) -> Option<&RiskParams> {
    product.and_then(|p| ledgers.product(p)).map(|c| &c.risk)
}

// 7.2: one group's health contribution. INVALID_HEALTH when any nonzero leg
// sits outside the risk system.
pub fn group_health(
    ledgers: &Ledgers,
    config: &CoreConfig,
    decomposition: &GroupDecomposition,
    tier: HealthTier,
) -> Decimal {
    let spot_risk = risk_of(ledgers, decomposition.group.spot);
    let perp_risk = risk_of(ledgers, decomposition.group.perp);

    // sentinel check on the raw legs, before any netting
    if let Some(risk_params) = spot_risk {
        if !decomposition.spot_amount.is_zero()
            && risk::weight(risk_params, decomposition.spot_amount, tier) == UNSUPPORTED_WEIGHT
        {
            return INVALID_HEALTH;
        }
    }
    if let Some(risk_params) = perp_risk {
        if !decomposition.perp_amount.is_zero()
            && risk::weight(risk_params, decomposition.perp_amount, tier) == UNSUPPORTED_WEIGHT
        {
            return INVALID_HEALTH;
        }
    }

    let mut health = decomposition.perp_v_quote + decomposition.lp_quote;

    if !decomposition.basis.is_zero() {
        if let (Some(spot_risk), Some(perp_risk)) = (spot_risk, perp_risk) {
            health += decomposition.basis
                * (decomposition.spot_price - decomposition.perp_price);
            health -= risk::spread_penalty(
                spot_risk,
                perp_risk,
                decomposition.basis.abs(),
                decomposition.spot_price,
                tier,
                config.spread_discount_factor,
            );
        }
    }

    let spot_residual = decomposition.spot_residual();
    if !spot_residual.is_zero() {
        if let Some(risk_params) = spot_risk {
            let weight = risk::weight(risk_params, spot_residual, tier);
            health += spot_residual * decomposition.spot_price * weight;
        }
    }

    let perp_residual = decomposition.perp_residual();
    if !perp_residual.is_zero() {
        if let Some(risk_params) = perp_risk {
            let weight = risk::weight(risk_params, perp_residual, tier);
            health += perp_residual * decomposition.perp_price * weight;
        }
    }

    // settlement tier: positive unsettled perp pnl does not count as collateral
    if tier == HealthTier::SettlementPnl {
        let pnl = decomposition.perp_v_quote
            + decomposition.perp_amount * decomposition.perp_price;
        if pnl > Decimal::ZERO {
            health -= pnl;
        }
    }

    health
}

// 7.3: whole-account health. real quote balance plus every group's
// contribution.
pub fn get_health(
    ledgers: &Ledgers,
    prices: &OraclePrices,
    config: &CoreConfig,
    account: AccountId,
    tier: HealthTier,
) -> Decimal {
    let mut health = ledgers.spot.balance_real(QUOTE_PRODUCT, account);

    for (_, group) in ledgers.groups.iter() {
        let decomposition = decompose(ledgers, prices, account, group);
        let contribution = group_health(ledgers, config, &decomposition, tier);
        if contribution == INVALID_HEALTH {
            return INVALID_HEALTH;
        }
        health += contribution;
    }

    health
}

pub fn get_core_risk(
    ledgers: &Ledgers,
    prices: &OraclePrices,
    account: AccountId,
    product: ProductId,
    tier: HealthTier,
) -> Option<CoreRisk> {
    let config = ledgers.product(product)?;
    let (lp_base, _) = ledgers.pools.pro_rata(product, account);
    let amount = match config.kind {
        crate::types::ProductKind::Spot => ledgers.spot.balance_real(product, account) + lp_base,
        crate::types::ProductKind::Perp => ledgers.perp.balance(product, account).amount + lp_base,
    };
    Some(CoreRisk {
        amount,
        price: prices.get(product),
        weight: risk::weight(&config.risk, amount, tier),
    })
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
    const ALICE: AccountId = AccountId(7);

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

    fn setup() -> (Ledgers, OraclePrices, CoreConfig) {
        let now = Timestamp::from_secs(0);
        let mut ledgers = Ledgers::new();
        let config = CoreConfig::default();

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
        ledgers.pools.add_pool(SPOT).unwrap();

        ledgers.products.insert(
            PERP,
            ProductConfig {
                kind: ProductKind::Perp,
                risk: risk_params(),
            },
        );
        ledgers.perp.add_product(PERP, now).unwrap();
        ledgers.pools.add_pool(PERP).unwrap();

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

        (ledgers, prices, config)
    }

    #[test]
    fn quote_only_health_is_the_balance() {
        let (mut ledgers, prices, config) = setup();
        ledgers.spot.apply_delta(QUOTE_PRODUCT, ALICE, dec!(1000)).unwrap();

        for tier in [
            HealthTier::Initial,
            HealthTier::Maintenance,
            HealthTier::SettlementPnl,
        ] {
            assert_eq!(
                get_health(&ledgers, &prices, &config, ALICE, tier),
                dec!(1000)
            );
        }
    }

    #[test]
    fn short_spot_weighted_against_quote() {
        let (mut ledgers, prices, config) = setup();
        ledgers.spot.apply_delta(QUOTE_PRODUCT, ALICE, dec!(1000)).unwrap();
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(-100)).unwrap();

        // 1000 - 100 * 1.1 * 10 = -100
        assert_eq!(
            get_health(&ledgers, &prices, &config, ALICE, HealthTier::Initial),
            dec!(-100)
        );
        // maintenance is looser: 1000 - 100 * 1.05 * 10 = -50
        assert_eq!(
            get_health(&ledgers, &prices, &config, ALICE, HealthTier::Maintenance),
            dec!(-50)
        );
    }

    #[test]
    fn basis_position_nets_to_spread_treatment() {
        let (mut ledgers, prices, config) = setup();
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(50)).unwrap();
        ledgers.perp.apply_delta(PERP, ALICE, dec!(-50), dec!(500)).unwrap();

        let health = get_health(&ledgers, &prices, &config, ALICE, HealthTier::Initial);

        // basis 50 at equal prices: leg values cancel, vquote 500 counts at par,
        // minus the spread penalty on 500 notional:
        // midpoint((1-0.9)*500, (1.1-1)*500) / 5 = 10
        assert_eq!(health, dec!(490));

        // summing unhedged weights instead would cost 100:
        // 50*10*0.9 + (-50)*10*1.1 + 500 = 400
        let unhedged = dec!(400);
        assert!(health > unhedged);
    }

    #[test]
    fn partial_overlap_leaves_weighted_residual() {
        let (mut ledgers, prices, config) = setup();
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(80)).unwrap();
        ledgers.perp.apply_delta(PERP, ALICE, dec!(-50), dec!(500)).unwrap();

        let health = get_health(&ledgers, &prices, &config, ALICE, HealthTier::Initial);

        // basis 50 (penalty 10 on 500 notional), residual 30 long spot at 0.9
        // 0 + 500 - 10 + 30*10*0.9 = 760
        assert_eq!(health, dec!(760));
    }

    #[test]
    fn reversed_basis_sign() {
        let (mut ledgers, prices, config) = setup();
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(-50)).unwrap();
        ledgers.perp.apply_delta(PERP, ALICE, dec!(50), dec!(-500)).unwrap();

        let decomposition = decompose(
            &ledgers,
            &prices,
            ALICE,
            ledgers.groups.get(crate::types::HealthGroupId(0)).unwrap(),
        );
        assert_eq!(decomposition.basis, dec!(-50));
        assert_eq!(decomposition.spot_residual(), Decimal::ZERO);
        assert_eq!(decomposition.perp_residual(), Decimal::ZERO);

        let health = get_health(&ledgers, &prices, &config, ALICE, HealthTier::Initial);
        // legs cancel, vquote -500, penalty 10
        assert_eq!(health, dec!(-510));
    }

    #[test]
    fn lp_shares_count_pro_rata() {
        let (mut ledgers, prices, config) = setup();
        ledgers.spot.apply_delta(QUOTE_PRODUCT, ALICE, dec!(1000)).unwrap();
        ledgers
            .pools
            .mint(SPOT, ALICE, dec!(10), dec!(0), dec!(1000), dec!(10))
            .unwrap();

        let health = get_health(&ledgers, &prices, &config, ALICE, HealthTier::Initial);

        // full pool ownership: 10 base at 0.9 weight plus 100 quote at par
        // 1000 + 10*10*0.9 + 100 = 1190
        assert_eq!(health, dec!(1190));
    }

    #[test]
    fn unsupported_weight_poisons_health() {
        let (mut ledgers, prices, config) = setup();
        let product = ledgers.products.get_mut(&SPOT).unwrap();
        product.risk.short_weight_initial = UNSUPPORTED_WEIGHT;
        product.risk.short_weight_maintenance = UNSUPPORTED_WEIGHT;

        ledgers.spot.apply_delta(QUOTE_PRODUCT, ALICE, dec!(1_000_000)).unwrap();
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(-1)).unwrap();

        assert_eq!(
            get_health(&ledgers, &prices, &config, ALICE, HealthTier::Initial),
            INVALID_HEALTH
        );
    }

    #[test]
    fn settlement_tier_excludes_positive_pnl() {
        let (mut ledgers, prices, config) = setup();
        ledgers.spot.apply_delta(QUOTE_PRODUCT, ALICE, dec!(1000)).unwrap();
        ledgers.perp.apply_delta(PERP, ALICE, dec!(10), dec!(-50)).unwrap();

        let maintenance =
            get_health(&ledgers, &prices, &config, ALICE, HealthTier::Maintenance);
        let settlement =
            get_health(&ledgers, &prices, &config, ALICE, HealthTier::SettlementPnl);

        // pnl = -50 + 10*10 = 50, excluded at the settlement tier
        assert_eq!(maintenance - settlement, dec!(50));
    }

    #[test]
    fn core_risk_reports_amount_price_weight() {
        let (mut ledgers, prices, _) = setup();
        ledgers.spot.apply_delta(SPOT, ALICE, dec!(-100)).unwrap();

        let core_risk =
            get_core_risk(&ledgers, &prices, ALICE, SPOT, HealthTier::Initial).unwrap();
        assert_eq!(core_risk.amount, dec!(-100));
        assert_eq!(core_risk.price, dec!(10));
        assert_eq!(core_risk.weight, dec!(1.1));
    }
}
