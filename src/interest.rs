// 3.0: spot balance ledger. balances are stored normalized; a per-product pair
// of cumulative multipliers (deposit side, borrow side) converts them to real
// amounts lazily. interest accrual only ever touches the two multipliers, so a
// tick costs the same whether one account holds the product or a million do.
//
// 3.1 has the rate curve, 3.2 the ledger, 3.3 accrual, 3.4 socialization.

use crate::types::{
    clamp, div_to_zero, AccountId, ProductId, Timestamp, SECONDS_PER_YEAR,
};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// 3.1: piecewise-linear annualized borrow rate over utilization. floor below
// the inflection point, then a steeper slope up to full utilization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestParams {
    pub floor_rate: Decimal,
    pub inflection_utilization: Decimal,
    pub rate_at_inflection: Decimal,
    pub rate_at_full: Decimal,
}

impl Default for InterestParams {
    fn default() -> Self {
        Self {
            floor_rate: dec!(0.01),
            inflection_utilization: dec!(0.8),
            rate_at_inflection: dec!(0.1),
            rate_at_full: dec!(1.0),
        }
    }
}

impl InterestParams {
    pub fn annual_rate(&self, utilization: Decimal) -> Decimal {
        let u = clamp(utilization, Decimal::ZERO, Decimal::ONE);
        if u <= self.inflection_utilization {
            if self.inflection_utilization.is_zero() {
                return self.floor_rate;
            }
            self.floor_rate
                + (self.rate_at_inflection - self.floor_rate) * u / self.inflection_utilization
        } else {
            let span = Decimal::ONE - self.inflection_utilization;
            self.rate_at_inflection
                + (self.rate_at_full - self.rate_at_inflection) * (u - self.inflection_utilization)
                    / span
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotProductState {
    pub cumulative_deposits_multiplier: Decimal,
    pub cumulative_borrows_multiplier: Decimal,
    pub total_deposits_normalized: Decimal,
    pub total_borrows_normalized: Decimal,
    pub interest: InterestParams,
    pub last_update: Timestamp,
}

impl SpotProductState {
    pub fn new(interest: InterestParams, now: Timestamp) -> Self {
        Self {
            cumulative_deposits_multiplier: Decimal::ONE,
            cumulative_borrows_multiplier: Decimal::ONE,
            total_deposits_normalized: Decimal::ZERO,
            total_borrows_normalized: Decimal::ZERO,
            interest,
            last_update: now,
        }
    }

    pub fn total_deposits_real(&self) -> Decimal {
        self.total_deposits_normalized * self.cumulative_deposits_multiplier
    }

    pub fn total_borrows_real(&self) -> Decimal {
        self.total_borrows_normalized * self.cumulative_borrows_multiplier
    }

    /// Utilization is undefined when there are no deposits; treated as zero.
    pub fn utilization(&self) -> Decimal {
        let deposits = self.total_deposits_real();
        if deposits.is_zero() {
            return Decimal::ZERO;
        }
        clamp(self.total_borrows_real() / deposits, Decimal::ZERO, Decimal::ONE)
    }
}

// positive normalized = deposit, negative = borrow. springs into existence on
// first write, only ever zeroed afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotBalance {
    pub amount_normalized: Decimal,
    pub last_cumulative_multiplier: Decimal,
}

/// What one interest tick did, for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestAccrual {
    pub product: ProductId,
    pub utilization: Decimal,
    pub annual_rate: Decimal,
    pub interest: Decimal,
    pub fee: Decimal,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SpotError {
    #[error("spot product {0:?} not found")]
    ProductNotFound(ProductId),

    #[error("spot product {0:?} already exists")]
    DuplicateProduct(ProductId),

    #[error("stale tick: {dt}s elapsed, fence is {fence}s")]
    StaleTick { dt: i64, fence: i64 },
}

// 3.2: the ledger proper. one state record per product, one balance per
// (product, account) pair.
#[derive(Debug, Clone, Default)]
pub struct SpotLedger {
    products: HashMap<ProductId, SpotProductState>,
    balances: HashMap<(ProductId, AccountId), SpotBalance>,
}

impl SpotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(
        &mut self,
        product: ProductId,
        interest: InterestParams,
        now: Timestamp,
    ) -> Result<(), SpotError> {
        if self.products.contains_key(&product) {
            return Err(SpotError::DuplicateProduct(product));
        }
        self.products
            .insert(product, SpotProductState::new(interest, now));
        Ok(())
    }

    pub fn has_product(&self, product: ProductId) -> bool {
        self.products.contains_key(&product)
    }

    pub fn product(&self, product: ProductId) -> Option<&SpotProductState> {
        self.products.get(&product)
    }

    /// Real (multiplier-applied) balance; zero for untouched pairs.
    pub fn balance_real(&self, product: ProductId, account: AccountId) -> Decimal {
        let Some(state) = self.products.get(&product) else {
            return Decimal::ZERO;
        };
        let Some(balance) = self.balances.get(&(product, account)) else {
            return Decimal::ZERO;
        };
        realize(balance.amount_normalized, state)
    }

    /// Apply a real-amount delta to one balance. Returns the new real amount.
    pub fn apply_delta(
        &mut self,
        product: ProductId,
        account: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, SpotError> {
        let state = self
            .products
            .get_mut(&product)
            .ok_or(SpotError::ProductNotFound(product))?;
        let balance = self.balances.entry((product, account)).or_default();

        let old_norm = balance.amount_normalized;
        let old_real = realize(old_norm, state);
        remove_from_totals(state, old_norm);

        let new_real = old_real + delta;
        let multiplier = if new_real >= Decimal::ZERO {
            state.cumulative_deposits_multiplier
        } else {
            state.cumulative_borrows_multiplier
        };
        let new_norm = div_to_zero(new_real, multiplier);

        balance.amount_normalized = new_norm;
        balance.last_cumulative_multiplier = multiplier;
        add_to_totals(state, new_norm);

        Ok(realize(new_norm, state))
    }

    // 3.3: interest accrual. continuous compounding on the borrow multiplier;
    // the deposit multiplier absorbs the accrued interest minus the protocol
    // fee skim, so ledger value is conserved net of fees.
    pub fn tick(
        &mut self,
        product: ProductId,
        now: Timestamp,
        fee_fraction: Decimal,
        fees_account: AccountId,
        max_gap_secs: i64,
    ) -> Result<InterestAccrual, SpotError> {
        let state = self
            .products
            .get_mut(&product)
            .ok_or(SpotError::ProductNotFound(product))?;

        let dt = state.last_update.elapsed_secs(&now);
        if dt <= 0 || dt >= max_gap_secs {
            return Err(SpotError::StaleTick {
                dt,
                fence: max_gap_secs,
            });
        }

        let utilization = state.utilization();
        let rate = state.interest.annual_rate(utilization);
        state.last_update = now;

        if state.total_borrows_normalized.is_zero() || state.total_deposits_normalized.is_zero() {
            return Ok(InterestAccrual {
                product,
                utilization,
                annual_rate: rate,
                interest: Decimal::ZERO,
                fee: Decimal::ZERO,
            });
        }

        let exponent = rate * Decimal::from(dt) / SECONDS_PER_YEAR;
        let growth = exponent.exp();

        let old_mult = state.cumulative_borrows_multiplier;
        let new_mult = old_mult * growth;
        state.cumulative_borrows_multiplier = new_mult;

        let interest = state.total_borrows_normalized * (new_mult - old_mult);
        let fee = interest * fee_fraction;
        state.cumulative_deposits_multiplier +=
            (interest - fee) / state.total_deposits_normalized;

        if !fee.is_zero() {
            self.apply_delta(product, fees_account, fee)?;
        }

        Ok(InterestAccrual {
            product,
            utilization,
            annual_rate: rate,
            interest,
            fee,
        })
    }

    /// Move the accrual clock forward without accruing. Recovery path for a
    /// product whose tick gap passed the stale fence; interest over the gap
    /// is forfeited.
    pub fn resync(&mut self, product: ProductId, now: Timestamp) -> Result<(), SpotError> {
        let state = self
            .products
            .get_mut(&product)
            .ok_or(SpotError::ProductNotFound(product))?;
        if state.last_update.elapsed_secs(&now) > 0 {
            state.last_update = now;
        }
        Ok(())
    }

    // 3.4: loss socialization. an unrecoverable deficit is spread across all
    // depositors of the product by knocking down the deposit multiplier.
    pub fn socialize_loss(&mut self, product: ProductId, loss: Decimal) -> Result<(), SpotError> {
        let state = self
            .products
            .get_mut(&product)
            .ok_or(SpotError::ProductNotFound(product))?;
        if loss <= Decimal::ZERO || state.total_deposits_normalized.is_zero() {
            return Ok(());
        }
        let reduced =
            state.cumulative_deposits_multiplier - loss / state.total_deposits_normalized;
        state.cumulative_deposits_multiplier = reduced.max(Decimal::ZERO);
        Ok(())
    }

    /// Deposits minus borrows in real terms, for conservation checks.
    pub fn net_real(&self, product: ProductId) -> Decimal {
        self.products
            .get(&product)
            .map(|s| s.total_deposits_real() - s.total_borrows_real())
            .unwrap_or(Decimal::ZERO)
    }
}

fn realize(amount_normalized: Decimal, state: &SpotProductState) -> Decimal {
    if amount_normalized >= Decimal::ZERO {
        amount_normalized * state.cumulative_deposits_multiplier
    } else {
        amount_normalized * state.cumulative_borrows_multiplier
    }
}

fn remove_from_totals(state: &mut SpotProductState, normalized: Decimal) {
    if normalized > Decimal::ZERO {
        state.total_deposits_normalized -= normalized;
    } else if normalized < Decimal::ZERO {
        state.total_borrows_normalized -= -normalized;
    }
}

fn add_to_totals(state: &mut SpotProductState, normalized: Decimal) {
    if normalized > Decimal::ZERO {
        state.total_deposits_normalized += normalized;
    } else if normalized < Decimal::ZERO {
        state.total_borrows_normalized += -normalized;
    }
}
