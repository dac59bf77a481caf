// 4.0: perpetual funding ledger. each position carries a base amount and a
// virtual quote balance; a per-product pair of cumulative funding indices
// (long side, short side) accrues funding globally. outstanding funding is
// folded into the virtual quote balance whenever a balance is touched.
//
// the two indices move identically during normal accrual. they only diverge
// when a loss is socialized across the product, which charges both sides.

use crate::types::{clamp, AccountId, ProductId, Timestamp};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerpProductState {
    pub cumulative_funding_long: Decimal,
    pub cumulative_funding_short: Decimal,
    /// EMA-smoothed mark price used for funding; decays toward each update.
    pub mark_price_ema: Decimal,
    /// Sum of all long base amounts.
    pub open_interest: Decimal,
    /// Sum of all short base amounts, as a positive number.
    pub open_interest_short: Decimal,
    /// Budget available for settling positive realized PnL into real quote.
    pub available_settle: Decimal,
    pub last_update: Timestamp,
}

impl PerpProductState {
    pub fn new(now: Timestamp) -> Self {
        Self {
            cumulative_funding_long: Decimal::ZERO,
            cumulative_funding_short: Decimal::ZERO,
            mark_price_ema: Decimal::ZERO,
            open_interest: Decimal::ZERO,
            open_interest_short: Decimal::ZERO,
            available_settle: Decimal::ZERO,
            last_update: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerpBalance {
    pub amount: Decimal,
    pub v_quote_balance: Decimal,
    pub last_cumulative_funding: Decimal,
}

/// What one funding tick did, for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingAccrual {
    pub product: ProductId,
    pub mark_price_ema: Decimal,
    /// Quote paid per unit of base position over this tick. Positive means
    /// longs paid shorts.
    pub payment: Decimal,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PerpError {
    #[error("perp product {0:?} not found")]
    ProductNotFound(ProductId),

    #[error("perp product {0:?} already exists")]
    DuplicateProduct(ProductId),

    #[error("stale tick: {dt}s elapsed, fence is {fence}s")]
    StaleTick { dt: i64, fence: i64 },
}

#[derive(Debug, Clone, Default)]
pub struct PerpLedger {
    products: HashMap<ProductId, PerpProductState>,
    balances: HashMap<(ProductId, AccountId), PerpBalance>,
}

impl PerpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&mut self, product: ProductId, now: Timestamp) -> Result<(), PerpError> {
        if self.products.contains_key(&product) {
            return Err(PerpError::DuplicateProduct(product));
        }
        self.products.insert(product, PerpProductState::new(now));
        Ok(())
    }

    pub fn has_product(&self, product: ProductId) -> bool {
        self.products.contains_key(&product)
    }

    pub fn product(&self, product: ProductId) -> Option<&PerpProductState> {
        self.products.get(&product)
    }

    /// Balance with outstanding funding folded in, without mutating the ledger.
    pub fn balance(&self, product: ProductId, account: AccountId) -> PerpBalance {
        let Some(state) = self.products.get(&product) else {
            return PerpBalance::default();
        };
        let Some(raw) = self.balances.get(&(product, account)) else {
            return PerpBalance::default();
        };
        project(*raw, state)
    }

    // 4.1: delta application. funding since the last touch is realized into
    // the virtual quote balance first, then the deltas land.
    pub fn apply_delta(
        &mut self,
        product: ProductId,
        account: AccountId,
        amount_delta: Decimal,
        v_quote_delta: Decimal,
    ) -> Result<PerpBalance, PerpError> {
        let state = self
            .products
            .get_mut(&product)
            .ok_or(PerpError::ProductNotFound(product))?;
        let balance = self.balances.entry((product, account)).or_default();

        *balance = project(*balance, state);

        let old_amount = balance.amount;
        balance.amount += amount_delta;
        balance.v_quote_balance += v_quote_delta;
        // amount sign may have flipped; re-anchor on the side now in effect
        balance.last_cumulative_funding = if balance.amount >= Decimal::ZERO {
            state.cumulative_funding_long
        } else {
            state.cumulative_funding_short
        };

        state.open_interest +=
            balance.amount.max(Decimal::ZERO) - old_amount.max(Decimal::ZERO);
        state.open_interest_short +=
            (-balance.amount).max(Decimal::ZERO) - (-old_amount).max(Decimal::ZERO);

        Ok(*balance)
    }

    // 4.2: funding accrual. the mark price is EMA-smoothed with factor
    // e^(-dt/tau); the payment rate is the clamped mark/oracle gap scaled by
    // elapsed time over the funding period, added identically to both indices.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        product: ProductId,
        now: Timestamp,
        mark_price: Decimal,
        oracle_price: Decimal,
        funding_period_secs: Decimal,
        ema_tau_secs: Decimal,
        max_price_diff_fraction: Decimal,
        max_gap_secs: i64,
    ) -> Result<FundingAccrual, PerpError> {
        let state = self
            .products
            .get_mut(&product)
            .ok_or(PerpError::ProductNotFound(product))?;

        let dt = state.last_update.elapsed_secs(&now);
        if dt <= 0 || dt >= max_gap_secs {
            return Err(PerpError::StaleTick {
                dt,
                fence: max_gap_secs,
            });
        }
        let dt_dec = Decimal::from(dt);

        state.mark_price_ema = if state.mark_price_ema.is_zero() {
            mark_price
        } else {
            let factor = (-dt_dec / ema_tau_secs).exp();
            factor * state.mark_price_ema + (Decimal::ONE - factor) * mark_price
        };

        let bound = max_price_diff_fraction * oracle_price;
        let diff = clamp(state.mark_price_ema - oracle_price, -bound, bound);
        let payment = diff * dt_dec / funding_period_secs;

        state.cumulative_funding_long += payment;
        state.cumulative_funding_short += payment;
        state.last_update = now;

        Ok(FundingAccrual {
            product,
            mark_price_ema: state.mark_price_ema,
            payment,
        })
    }

    // 4.3: settlement plumbing. moves realized virtual-quote PnL out of (or
    // into) the position; the caller pairs it with the real quote leg and the
    // health gate. positive settlements drain the product budget, negative
    // ones refill it.
    pub fn take_settlement(
        &mut self,
        product: ProductId,
        account: AccountId,
        amount: Decimal,
    ) -> Result<(), PerpError> {
        self.apply_delta(product, account, Decimal::ZERO, -amount)?;
        let state = self
            .products
            .get_mut(&product)
            .ok_or(PerpError::ProductNotFound(product))?;
        state.available_settle = (state.available_settle - amount).max(Decimal::ZERO);
        Ok(())
    }

    pub fn available_settle(&self, product: ProductId) -> Decimal {
        self.products
            .get(&product)
            .map(|s| s.available_settle)
            .unwrap_or(Decimal::ZERO)
    }

    // 4.4: loss socialization. both indices shift apart so every open unit,
    // long or short, is charged the same per-unit share of the loss. returns
    // the amount actually socialized (zero when there is no open interest).
    pub fn socialize_loss(&mut self, product: ProductId, loss: Decimal) -> Result<Decimal, PerpError> {
        let state = self
            .products
            .get_mut(&product)
            .ok_or(PerpError::ProductNotFound(product))?;
        let total = state.open_interest + state.open_interest_short;
        if loss <= Decimal::ZERO || total.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let shift = loss / total;
        state.cumulative_funding_long += shift;
        state.cumulative_funding_short -= shift;
        Ok(shift * total)
    }

    /// Move the funding clock forward without accruing. Recovery path for a
    /// product whose tick gap passed the stale fence; the EMA is dropped so
    /// the next tick re-seeds from a fresh mark.
    pub fn resync(&mut self, product: ProductId, now: Timestamp) -> Result<(), PerpError> {
        let state = self
            .products
            .get_mut(&product)
            .ok_or(PerpError::ProductNotFound(product))?;
        if state.last_update.elapsed_secs(&now) > 0 {
            state.last_update = now;
            state.mark_price_ema = Decimal::ZERO;
        }
        Ok(())
    }
}

fn project(mut balance: PerpBalance, state: &PerpProductState) -> PerpBalance {
    let index = if balance.amount >= Decimal::ZERO {
        state.cumulative_funding_long
    } else {
        state.cumulative_funding_short
    };
    balance.v_quote_balance -= balance.amount * (index - balance.last_cumulative_funding);
    balance.last_cumulative_funding = index;
    balance
}
