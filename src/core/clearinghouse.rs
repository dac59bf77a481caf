// 10.1: the clearinghouse struct. all state lives here; operation impls are
// spread across the sibling modules.

use super::results::CoreError;
use crate::config::CoreConfig;
use crate::events::{Event, EventCollector, EventPayload, InsuranceDepositEvent};
use crate::interest::InterestParams;
use crate::risk::RiskParams;
use crate::state::{HealthGroup, Ledgers, OraclePrices, ProductConfig};
use crate::types::{
    AccountId, CollaboratorId, HealthGroupId, ProductId, ProductKind, Timestamp, QUOTE_PRODUCT,
};
use rust_decimal::Decimal;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Clearinghouse {
    pub(super) ledgers: Ledgers,
    pub(super) prices: OraclePrices,
    pub(super) config: CoreConfig,
    pub(super) collaborators: HashSet<CollaboratorId>,
    pub(super) events: EventCollector,
    pub(super) current_time: Timestamp,
}

impl Clearinghouse {
    /// A fresh core holds only the quote product, counted at face value.
    pub fn new(config: CoreConfig, now: Timestamp) -> Self {
        let mut ledgers = Ledgers::new();
        ledgers.products.insert(
            QUOTE_PRODUCT,
            ProductConfig {
                kind: ProductKind::Spot,
                risk: RiskParams::face_value(),
            },
        );
        // the quote ledger cannot fail to initialize on an empty state
        let _ = ledgers
            .spot
            .add_product(QUOTE_PRODUCT, InterestParams::default(), now);

        let max_events = config.max_events;
        Self {
            ledgers,
            prices: OraclePrices::default(),
            config,
            collaborators: HashSet::new(),
            events: EventCollector::new(max_events),
            current_time: now,
        }
    }

    pub fn set_time(&mut self, now: Timestamp) {
        self.current_time = now;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = Timestamp::from_secs(self.current_time.as_secs() + secs);
    }

    // 10.1.1: product administration. a spot product gets an interest curve
    // and an AMM pool; a perp product gets a funding state and an AMM pool.
    pub fn add_spot_product(
        &mut self,
        product: ProductId,
        risk: RiskParams,
        interest: InterestParams,
    ) -> Result<(), CoreError> {
        risk.validate()?;
        self.ledgers
            .spot
            .add_product(product, interest, self.current_time)?;
        self.ledgers.pools.add_pool(product)?;
        self.ledgers.products.insert(
            product,
            ProductConfig {
                kind: ProductKind::Spot,
                risk,
            },
        );
        Ok(())
    }

    pub fn add_perp_product(
        &mut self,
        product: ProductId,
        risk: RiskParams,
    ) -> Result<(), CoreError> {
        risk.validate()?;
        self.ledgers.perp.add_product(product, self.current_time)?;
        self.ledgers.pools.add_pool(product)?;
        self.ledgers.products.insert(
            product,
            ProductConfig {
                kind: ProductKind::Perp,
                risk,
            },
        );
        Ok(())
    }

    pub fn add_health_group(&mut self, group: HealthGroup) -> Result<HealthGroupId, CoreError> {
        for product in [group.spot, group.perp].into_iter().flatten() {
            if !self.ledgers.products.contains_key(&product) {
                return Err(CoreError::ProductNotFound(product));
            }
        }
        Ok(self.ledgers.groups.add(group)?)
    }

    pub fn register_collaborator(&mut self, collaborator: CollaboratorId) {
        self.collaborators.insert(collaborator);
    }

    pub fn set_oracle_price(&mut self, product: ProductId, price: Decimal) {
        self.prices.set(product, price);
    }

    // 10.1.2: insurance fund top-up out of an account's quote balance.
    pub fn deposit_insurance(
        &mut self,
        from: AccountId,
        amount: Decimal,
    ) -> Result<(), CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount);
        }
        let available = self.ledgers.spot.balance_real(QUOTE_PRODUCT, from);
        if available < amount {
            return Err(CoreError::InsufficientBalance {
                account: from,
                requested: amount,
                available,
            });
        }
        self.ledgers.spot.apply_delta(QUOTE_PRODUCT, from, -amount)?;
        self.ledgers.insurance.deposit(amount);

        let new_balance = self.ledgers.insurance.balance();
        self.emit_event(EventPayload::InsuranceDeposit(InsuranceDepositEvent {
            from,
            amount,
            new_balance,
        }));
        Ok(())
    }

    pub fn insurance_balance(&self) -> Decimal {
        self.ledgers.insurance.balance()
    }

    pub fn ledgers(&self) -> &Ledgers {
        &self.ledgers
    }

    pub fn oracle_price(&self, product: ProductId) -> Decimal {
        self.prices.get(product)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.events()
    }

    pub(super) fn require_collaborator(
        &self,
        collaborator: CollaboratorId,
    ) -> Result<(), CoreError> {
        if self.collaborators.contains(&collaborator) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized(collaborator))
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        if self.config.verbose {
            println!("[event] {payload:?}");
        }
        self.events.emit(self.current_time, payload);
    }
}
