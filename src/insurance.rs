//! Protocol insurance fund.
//!
//! A single signed scalar, created at zero and mutated only through the
//! operations below: explicit deposits, liquidation shortfall cover,
//! liquidation fee accrual, and socialization draw-down. It may only dip
//! negative transiently inside one atomic liquidation step; every commit
//! leaves it at or above zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsuranceFund {
    balance: Decimal,
    total_deposits: Decimal,
    total_covered: Decimal,
    total_fees: Decimal,
}

impl InsuranceFund {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn deposit(&mut self, amount: Decimal) {
        self.balance += amount;
        self.total_deposits += amount;
    }

    /// Cover a shortfall, capped at the available balance. Returns the amount
    /// actually covered.
    pub fn cover(&mut self, shortfall: Decimal) -> Decimal {
        let covered = shortfall.min(self.balance).max(Decimal::ZERO);
        self.balance -= covered;
        self.total_covered += covered;
        covered
    }

    pub fn accrue_fee(&mut self, fee: Decimal) {
        self.balance += fee;
        self.total_fees += fee;
    }

    pub fn lifetime_covered(&self) -> Decimal {
        self.total_covered
    }
}
