// 5.0: per-product AMM. virtual base/quote reserves with an LP share supply.
// mint and burn are strictly proportional; swap is constant-product against
// the reserves, bounded by the caller's limit price widened by a configured
// spread, and clipped to the caller's size increment.
//
// invariant: supply == 0 exactly when both reserves are zero.

use crate::types::{div_to_zero, AccountId, ProductId, DECIMAL_SCALE};
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LpPoolState {
    pub shares_supply: Decimal,
    pub base: Decimal,
    pub quote: Decimal,
}

impl LpPoolState {
    /// Pool price, quote per base. None when the pool is empty.
    pub fn price(&self) -> Option<Decimal> {
        if self.base.is_zero() {
            None
        } else {
            Some(self.quote / self.base)
        }
    }
}

/// Burn either an explicit share count or the caller's whole position. The
/// liquidation engine uses `All` to decompose LP holdings before measuring legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurnAmount {
    Shares(Decimal),
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintResult {
    pub shares: Decimal,
    pub quote_required: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnResult {
    pub shares: Decimal,
    pub base_out: Decimal,
    pub quote_out: Decimal,
}

/// Deltas from the taker's perspective: positive = taker receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResult {
    pub base_delta: Decimal,
    pub quote_delta: Decimal,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("pool for product {0:?} not found")]
    PoolNotFound(ProductId),

    #[error("pool for product {0:?} already exists")]
    DuplicatePool(ProductId),

    #[error("insufficient LP shares: requested {requested}, held {held}")]
    InsufficientShares { requested: Decimal, held: Decimal },

    #[error("slippage exceeded: required {required}, bounds [{low}, {high}]")]
    QuoteOutsideBounds {
        required: Decimal,
        low: Decimal,
        high: Decimal,
    },

    #[error("swap would cross limit price: pool at {pool_price}, limit {limit}")]
    LimitCrossed { pool_price: Decimal, limit: Decimal },

    #[error("pool for product {0:?} is empty")]
    EmptyPool(ProductId),

    #[error("amount must be nonzero and correctly signed")]
    InvalidAmount,
}

#[derive(Debug, Clone, Default)]
pub struct LpLedger {
    pools: HashMap<ProductId, LpPoolState>,
    positions: HashMap<(ProductId, AccountId), Decimal>,
}

impl LpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool(&mut self, product: ProductId) -> Result<(), PoolError> {
        if self.pools.contains_key(&product) {
            return Err(PoolError::DuplicatePool(product));
        }
        self.pools.insert(product, LpPoolState::default());
        Ok(())
    }

    pub fn pool(&self, product: ProductId) -> Option<&LpPoolState> {
        self.pools.get(&product)
    }

    pub fn shares(&self, product: ProductId, account: AccountId) -> Decimal {
        self.positions
            .get(&(product, account))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// The account's pro-rata claim on the reserves, (base, quote).
    pub fn pro_rata(&self, product: ProductId, account: AccountId) -> (Decimal, Decimal) {
        let Some(pool) = self.pools.get(&product) else {
            return (Decimal::ZERO, Decimal::ZERO);
        };
        let shares = self.shares(product, account);
        if shares.is_zero() || pool.shares_supply.is_zero() {
            return (Decimal::ZERO, Decimal::ZERO);
        }
        (
            div_to_zero(pool.base * shares, pool.shares_supply),
            div_to_zero(pool.quote * shares, pool.shares_supply),
        )
    }

    // 5.1: proportional mint. required quote follows the reserve ratio, or the
    // supplied oracle price on the first mint. rejected outside the caller's
    // slippage bounds.
    pub fn mint(
        &mut self,
        product: ProductId,
        account: AccountId,
        base_amount: Decimal,
        quote_low: Decimal,
        quote_high: Decimal,
        oracle_price: Decimal,
    ) -> Result<MintResult, PoolError> {
        if base_amount <= Decimal::ZERO {
            return Err(PoolError::InvalidAmount);
        }
        let pool = self
            .pools
            .get_mut(&product)
            .ok_or(PoolError::PoolNotFound(product))?;

        let (quote_required, shares) = if pool.shares_supply.is_zero() {
            let quote_required = base_amount * oracle_price;
            (quote_required, base_amount + quote_required)
        } else {
            let quote_required = div_to_zero(base_amount * pool.quote, pool.base);
            let shares = div_to_zero(base_amount * pool.shares_supply, pool.base);
            (quote_required, shares)
        };

        if quote_required < quote_low || quote_required > quote_high {
            return Err(PoolError::QuoteOutsideBounds {
                required: quote_required,
                low: quote_low,
                high: quote_high,
            });
        }

        pool.base += base_amount;
        pool.quote += quote_required;
        pool.shares_supply += shares;
        *self.positions.entry((product, account)).or_default() += shares;

        Ok(MintResult {
            shares,
            quote_required,
        })
    }

    // 5.2: proportional burn. `All` empties the caller's position.
    pub fn burn(
        &mut self,
        product: ProductId,
        account: AccountId,
        amount: BurnAmount,
    ) -> Result<BurnResult, PoolError> {
        let pool = self
            .pools
            .get_mut(&product)
            .ok_or(PoolError::PoolNotFound(product))?;
        let held = self
            .positions
            .get(&(product, account))
            .copied()
            .unwrap_or(Decimal::ZERO);

        let shares = match amount {
            BurnAmount::All => held,
            BurnAmount::Shares(s) => {
                if s < Decimal::ZERO || s > held {
                    return Err(PoolError::InsufficientShares {
                        requested: s,
                        held,
                    });
                }
                s
            }
        };
        if shares.is_zero() {
            return Ok(BurnResult {
                shares: Decimal::ZERO,
                base_out: Decimal::ZERO,
                quote_out: Decimal::ZERO,
            });
        }

        // full-supply burns divide exactly; partial burns truncate toward
        // zero, leaving any dust with the pool
        let base_out = div_to_zero(pool.base * shares, pool.shares_supply);
        let quote_out = div_to_zero(pool.quote * shares, pool.shares_supply);

        pool.base -= base_out;
        pool.quote -= quote_out;
        pool.shares_supply -= shares;
        if pool.shares_supply.is_zero() {
            pool.base = Decimal::ZERO;
            pool.quote = Decimal::ZERO;
        }
        *self.positions.entry((product, account)).or_default() -= shares;

        Ok(BurnResult {
            shares,
            base_out,
            quote_out,
        })
    }

    // 5.3: constant-product swap. positive max_amount buys base from the pool,
    // negative sells into it. the executable size is whatever keeps the pool
    // price inside limit * (1 +/- spread), clipped down to the size increment.
    // both legs settle at the ledger scale, rounded in the pool's favor, so
    // the taker deltas land on balances without residue and k never shrinks.
    pub fn swap(
        &mut self,
        product: ProductId,
        max_amount: Decimal,
        limit_price: Decimal,
        size_increment: Decimal,
        spread: Decimal,
    ) -> Result<SwapResult, PoolError> {
        if max_amount.is_zero() || limit_price <= Decimal::ZERO {
            return Err(PoolError::InvalidAmount);
        }
        let pool = self
            .pools
            .get_mut(&product)
            .ok_or(PoolError::PoolNotFound(product))?;
        if pool.base.is_zero() || pool.quote.is_zero() {
            return Err(PoolError::EmptyPool(product));
        }

        let k = pool.base * pool.quote;
        let pool_price = pool.quote / pool.base;

        if max_amount > Decimal::ZERO {
            // taker buys base; pool price rises toward the widened limit
            let limit = limit_price * (Decimal::ONE + spread);
            if pool_price >= limit {
                return Err(PoolError::LimitCrossed { pool_price, limit });
            }
            // price after removing x base is k / (base - x)^2; solve for x at the limit
            let base_at_limit = (k / limit).sqrt().ok_or(PoolError::InvalidAmount)?;
            let available = pool.base - base_at_limit;
            let amount = settle_scale(clip_to_increment(max_amount.min(available), size_increment));
            if amount <= Decimal::ZERO {
                return Err(PoolError::LimitCrossed { pool_price, limit });
            }

            let new_base = pool.base - amount;
            // taker pays the dust: round the quote owed up
            let quote_in = (k / new_base - pool.quote)
                .round_dp_with_strategy(DECIMAL_SCALE, RoundingStrategy::AwayFromZero);
            pool.base = new_base;
            pool.quote += quote_in;

            Ok(SwapResult {
                base_delta: amount,
                quote_delta: -quote_in,
            })
        } else {
            // taker sells base; pool price falls toward the widened limit
            let limit = limit_price * (Decimal::ONE - spread);
            if pool_price <= limit {
                return Err(PoolError::LimitCrossed { pool_price, limit });
            }
            let base_at_limit = (k / limit).sqrt().ok_or(PoolError::InvalidAmount)?;
            let available = base_at_limit - pool.base;
            let amount =
                settle_scale(clip_to_increment((-max_amount).min(available), size_increment));
            if amount <= Decimal::ZERO {
                return Err(PoolError::LimitCrossed { pool_price, limit });
            }

            let new_base = pool.base + amount;
            // taker forfeits the dust: truncate the quote owed to them
            let quote_out = (pool.quote - k / new_base)
                .round_dp_with_strategy(DECIMAL_SCALE, RoundingStrategy::ToZero);
            pool.base = new_base;
            pool.quote -= quote_out;

            Ok(SwapResult {
                base_delta: -amount,
                quote_delta: quote_out,
            })
        }
    }
}

fn clip_to_increment(amount: Decimal, size_increment: Decimal) -> Decimal {
    if size_increment <= Decimal::ZERO {
        return amount;
    }
    (amount / size_increment).floor() * size_increment
}

fn settle_scale(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(DECIMAL_SCALE, RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const P: ProductId = ProductId(1);
    const ALICE: AccountId = AccountId(1);
    const BOB: AccountId = AccountId(2);

    fn seeded() -> LpLedger {
        let mut ledger = LpLedger::new();
        ledger.add_pool(P).unwrap();
        // 100 base at oracle price 10 -> 1000 quote, 1100 shares
        ledger
            .mint(P, ALICE, dec!(100), dec!(0), dec!(10000), dec!(10))
            .unwrap();
        ledger
    }

    #[test]
    fn first_mint_uses_oracle_price() {
        let ledger = seeded();
        let pool = ledger.pool(P).unwrap();
        assert_eq!(pool.base, dec!(100));
        assert_eq!(pool.quote, dec!(1000));
        assert_eq!(pool.shares_supply, dec!(1100));
        assert_eq!(pool.price(), Some(dec!(10)));
    }

    #[test]
    fn later_mint_follows_reserve_ratio() {
        let mut ledger = seeded();
        let result = ledger
            .mint(P, BOB, dec!(50), dec!(0), dec!(10000), dec!(999))
            .unwrap();
        // ratio is 10 quote per base regardless of the oracle argument
        assert_eq!(result.quote_required, dec!(500));
        assert_eq!(result.shares, dec!(550));
    }

    #[test]
    fn mint_rejected_outside_slippage_bounds() {
        let mut ledger = seeded();
        let result = ledger.mint(P, BOB, dec!(50), dec!(0), dec!(499), dec!(10));
        assert!(matches!(result, Err(PoolError::QuoteOutsideBounds { .. })));
    }

    #[test]
    fn mint_then_burn_all_round_trips() {
        let mut ledger = seeded();
        let before = ledger.pool(P).unwrap().clone();

        ledger
            .mint(P, BOB, dec!(30), dec!(0), dec!(10000), dec!(10))
            .unwrap();
        let burned = ledger.burn(P, BOB, BurnAmount::All).unwrap();

        assert_eq!(burned.base_out, dec!(30));
        assert_eq!(burned.quote_out, dec!(300));
        let after = ledger.pool(P).unwrap();
        assert_eq!(after.base, before.base);
        assert_eq!(after.quote, before.quote);
        assert_eq!(after.shares_supply, before.shares_supply);
        assert_eq!(ledger.shares(P, BOB), Decimal::ZERO);
    }

    #[test]
    fn burn_more_than_held_rejected() {
        let mut ledger = seeded();
        let result = ledger.burn(P, ALICE, BurnAmount::Shares(dec!(2000)));
        assert!(matches!(result, Err(PoolError::InsufficientShares { .. })));
    }

    #[test]
    fn full_burn_zeroes_the_pool() {
        let mut ledger = seeded();
        ledger.burn(P, ALICE, BurnAmount::All).unwrap();
        let pool = ledger.pool(P).unwrap();
        assert_eq!(pool.shares_supply, Decimal::ZERO);
        assert_eq!(pool.base, Decimal::ZERO);
        assert_eq!(pool.quote, Decimal::ZERO);
    }

    #[test]
    fn pro_rata_share_of_reserves() {
        let mut ledger = seeded();
        ledger
            .mint(P, BOB, dec!(100), dec!(0), dec!(10000), dec!(10))
            .unwrap();
        // BOB holds half the supply now
        let (base, quote) = ledger.pro_rata(P, BOB);
        assert_eq!(base, dec!(100));
        assert_eq!(quote, dec!(1000));
    }

    #[test]
    fn swap_buy_moves_price_up_and_charges_quote() {
        let mut ledger = seeded();
        let result = ledger
            .swap(P, dec!(10), dec!(13), Decimal::ZERO, Decimal::ZERO)
            .unwrap();

        assert_eq!(result.base_delta, dec!(10));
        assert!(result.quote_delta < Decimal::ZERO);
        // taker paid more than 10 per unit on average
        assert!(-result.quote_delta > dec!(100));

        let pool = ledger.pool(P).unwrap();
        assert!(pool.price().unwrap() > dec!(10));
    }

    #[test]
    fn swap_clips_at_limit_price() {
        let mut ledger = seeded();
        // huge order, tight limit: fills only up to the limit
        let result = ledger
            .swap(P, dec!(90), dec!(12.1), Decimal::ZERO, Decimal::ZERO)
            .unwrap();
        assert!(result.base_delta < dec!(90));

        let pool = ledger.pool(P).unwrap();
        assert!(pool.price().unwrap() <= dec!(12.1) + dec!(0.0001));
    }

    #[test]
    fn swap_rejects_wrong_direction_limit() {
        let mut ledger = seeded();
        // pool at 10, buying with limit below pool price
        let result = ledger.swap(P, dec!(10), dec!(9), Decimal::ZERO, Decimal::ZERO);
        assert!(matches!(result, Err(PoolError::LimitCrossed { .. })));

        // selling with limit above pool price
        let result = ledger.swap(P, dec!(-10), dec!(11), Decimal::ZERO, Decimal::ZERO);
        assert!(matches!(result, Err(PoolError::LimitCrossed { .. })));
    }

    #[test]
    fn swap_settles_at_ledger_scale_with_dust_to_the_pool() {
        let mut ledger = seeded();
        // buying 10 against (100, 1000) owes 1000/9 quote, which never
        // terminates; the settled leg is 18dp and the pool keeps the dust
        let result = ledger
            .swap(P, dec!(10), dec!(13), Decimal::ZERO, Decimal::ZERO)
            .unwrap();
        assert_eq!(result.quote_delta, result.quote_delta.round_dp(18));
        assert_eq!(result.quote_delta, dec!(-111.111111111111111112));

        let pool = ledger.pool(P).unwrap();
        assert!(pool.base * pool.quote >= dec!(100000));
    }

    #[test]
    fn swap_respects_size_increment() {
        let mut ledger = seeded();
        let result = ledger
            .swap(P, dec!(7.7), dec!(15), dec!(0.5), Decimal::ZERO)
            .unwrap();
        assert_eq!(result.base_delta, dec!(7.5));
    }

    #[test]
    fn swap_sell_pays_out_quote() {
        let mut ledger = seeded();
        let result = ledger
            .swap(P, dec!(-10), dec!(8), Decimal::ZERO, Decimal::ZERO)
            .unwrap();
        assert_eq!(result.base_delta, dec!(-10));
        assert!(result.quote_delta > Decimal::ZERO);
        // taker received less than 10 per unit on average
        assert!(result.quote_delta < dec!(100));
    }

    #[test]
    fn swap_spread_widens_the_executable_band() {
        let mut ledger = seeded();
        // limit exactly at pool price: rejected without spread
        assert!(matches!(
            ledger.swap(P, dec!(1), dec!(10), Decimal::ZERO, Decimal::ZERO),
            Err(PoolError::LimitCrossed { .. })
        ));
        // a 5% spread opens room above the pool price
        let result = ledger.swap(P, dec!(1), dec!(10), Decimal::ZERO, dec!(0.05));
        assert!(result.is_ok());
    }

    #[test]
    fn swap_on_empty_pool_rejected() {
        let mut ledger = LpLedger::new();
        ledger.add_pool(P).unwrap();
        let result = ledger.swap(P, dec!(1), dec!(10), Decimal::ZERO, Decimal::ZERO);
        assert!(matches!(result, Err(PoolError::EmptyPool(_))));
    }
}
