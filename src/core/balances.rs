// 10.2: balance operations. deposits are unconditional; withdrawals may
// create a borrow but must leave initial health non-negative; collaborator
// delta batches apply atomically across every account they touch.

use super::clearinghouse::Clearinghouse;
use super::results::CoreError;
use crate::events::{
    DeltasAppliedEvent, DepositEvent, EventPayload, PnlSettledEvent, WithdrawalEvent,
};
use crate::types::{AccountId, CollaboratorId, HealthTier, ProductId, ProductKind, QUOTE_PRODUCT};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// One signed balance change pushed by a collaborator.
#[derive(Debug, Clone)]
pub struct BalanceDelta {
    pub product: ProductId,
    pub account: AccountId,
    pub amount: Decimal,
    /// Perp virtual quote leg; ignored for spot products.
    pub v_quote: Decimal,
}

impl Clearinghouse {
    pub fn deposit(
        &mut self,
        account: AccountId,
        product: ProductId,
        amount: Decimal,
    ) -> Result<(), CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount);
        }
        self.require_kind(product, ProductKind::Spot)?;

        let new_balance = self.ledgers.spot.apply_delta(product, account, amount)?;
        self.emit_event(EventPayload::Deposit(DepositEvent {
            account,
            product,
            amount,
            new_balance,
        }));
        Ok(())
    }

    /// Withdrawing past the balance opens a borrow; the initial health gate
    /// decides whether the account can carry it.
    pub fn withdraw(
        &mut self,
        account: AccountId,
        product: ProductId,
        amount: Decimal,
    ) -> Result<(), CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount);
        }
        self.require_kind(product, ProductKind::Spot)?;

        let snapshot = self.ledgers.clone();
        let new_balance = self.ledgers.spot.apply_delta(product, account, -amount)?;
        if let Err(e) = self.check_initial_health(account) {
            self.ledgers = snapshot;
            return Err(e);
        }

        self.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
            account,
            product,
            amount,
            new_balance,
        }));
        Ok(())
    }

    // 10.2.1: collaborator delta batch. all deltas land or none do, and every
    // account the batch touches must come out at or above initial health.
    pub fn apply_deltas(
        &mut self,
        collaborator: CollaboratorId,
        deltas: &[BalanceDelta],
    ) -> Result<(), CoreError> {
        self.require_collaborator(collaborator)?;

        let snapshot = self.ledgers.clone();
        let touched = match self.apply_delta_batch(deltas) {
            Ok(touched) => touched,
            Err(e) => {
                self.ledgers = snapshot;
                return Err(e);
            }
        };

        self.emit_event(EventPayload::DeltasApplied(DeltasAppliedEvent {
            collaborator: collaborator.0,
            accounts_touched: touched,
        }));
        Ok(())
    }

    fn apply_delta_batch(&mut self, deltas: &[BalanceDelta]) -> Result<usize, CoreError> {
        let mut touched: HashSet<AccountId> = HashSet::new();
        for delta in deltas {
            let kind = self
                .ledgers
                .product(delta.product)
                .ok_or(CoreError::ProductNotFound(delta.product))?
                .kind;
            match kind {
                ProductKind::Spot => {
                    self.ledgers
                        .spot
                        .apply_delta(delta.product, delta.account, delta.amount)?;
                }
                ProductKind::Perp => {
                    self.ledgers.perp.apply_delta(
                        delta.product,
                        delta.account,
                        delta.amount,
                        delta.v_quote,
                    )?;
                }
            }
            touched.insert(delta.account);
        }
        for account in &touched {
            self.check_initial_health(*account)?;
        }
        Ok(touched.len())
    }

    // 10.2.2: realized-pnl settlement. moves virtual quote into real quote,
    // bounded by the product budget and gated on the settlement tier so paper
    // profit cannot be cashed out against thin collateral.
    pub fn settle_pnl(
        &mut self,
        collaborator: CollaboratorId,
        account: AccountId,
        product: ProductId,
        amount: Decimal,
    ) -> Result<(), CoreError> {
        self.require_collaborator(collaborator)?;
        if amount.is_zero() {
            return Err(CoreError::InvalidAmount);
        }
        self.require_kind(product, ProductKind::Perp)?;

        if amount > Decimal::ZERO {
            let available = self.ledgers.perp.available_settle(product);
            if amount > available {
                return Err(CoreError::SettlementBudgetExceeded {
                    requested: amount,
                    available,
                });
            }
        }

        let snapshot = self.ledgers.clone();
        let result = (|this: &mut Self| -> Result<(), CoreError> {
            this.ledgers.perp.take_settlement(product, account, amount)?;
            this.ledgers.spot.apply_delta(QUOTE_PRODUCT, account, amount)?;
            if amount > Decimal::ZERO {
                this.check_health(account, HealthTier::SettlementPnl)?;
            }
            Ok(())
        })(self);
        if let Err(e) = result {
            self.ledgers = snapshot;
            return Err(e);
        }

        self.emit_event(EventPayload::PnlSettled(PnlSettledEvent {
            account,
            product,
            amount,
        }));
        Ok(())
    }

    pub(super) fn require_kind(
        &self,
        product: ProductId,
        kind: ProductKind,
    ) -> Result<(), CoreError> {
        let config = self
            .ledgers
            .product(product)
            .ok_or(CoreError::ProductNotFound(product))?;
        if config.kind != kind {
            return Err(CoreError::WrongProductKind(product));
        }
        Ok(())
    }
}
