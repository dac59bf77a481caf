// 10.4: health queries, the accrual tick, and the liquidation entry point.

use super::clearinghouse::Clearinghouse;
use super::results::{CoreError, TickResult};
use crate::events::{EventPayload, LiquidationEvent, LossSocializedEvent};
use crate::health::{self, CoreRisk};
use crate::liquidation::{self, LiquidationOutcome};
use crate::types::{
    AccountId, HealthGroupId, HealthTier, LiquidationMode, ProductId, ProductKind, Timestamp,
};
use rust_decimal::Decimal;

impl Clearinghouse {
    pub fn get_health(&self, account: AccountId, tier: HealthTier) -> Decimal {
        health::get_health(&self.ledgers, &self.prices, &self.config, account, tier)
    }

    pub fn get_core_risk(
        &self,
        account: AccountId,
        product: ProductId,
        tier: HealthTier,
    ) -> Option<CoreRisk> {
        health::get_core_risk(&self.ledgers, &self.prices, account, product, tier)
    }

    // INVALID_HEALTH compares below zero, so one check covers both rejections.
    pub(super) fn check_health(
        &self,
        account: AccountId,
        tier: HealthTier,
    ) -> Result<(), CoreError> {
        let health = self.get_health(account, tier);
        if health < Decimal::ZERO {
            return Err(CoreError::HealthViolation { account, health });
        }
        Ok(())
    }

    pub(super) fn check_initial_health(&self, account: AccountId) -> Result<(), CoreError> {
        self.check_health(account, HealthTier::Initial)
    }

    // 10.4.1: the clock tick. accrues borrow interest on every spot product
    // and funding on every perp product a mark price arrived for. all
    // accruals land together or not at all.
    pub fn tick(
        &mut self,
        now: Timestamp,
        mark_prices: &[(ProductId, Decimal)],
    ) -> Result<TickResult, CoreError> {
        let snapshot = self.ledgers.clone();
        let previous_time = self.current_time;
        self.current_time = now;

        let result = (|this: &mut Self| -> Result<TickResult, CoreError> {
            let mut tick = TickResult::default();

            let mut spot_products: Vec<ProductId> = this
                .ledgers
                .products
                .iter()
                .filter(|(_, c)| c.kind == ProductKind::Spot)
                .map(|(p, _)| *p)
                .collect();
            spot_products.sort();
            for product in spot_products {
                let accrual = this.ledgers.spot.tick(
                    product,
                    now,
                    this.config.protocol_fee_fraction,
                    this.config.fees_account,
                    this.config.max_tick_gap_secs,
                )?;
                tick.interest.push(accrual);
            }

            for &(product, mark_price) in mark_prices {
                this.require_kind(product, ProductKind::Perp)?;
                let oracle = this.prices.get(product);
                let accrual = this.ledgers.perp.tick(
                    product,
                    now,
                    mark_price,
                    oracle,
                    this.config.funding_period_secs,
                    this.config.ema_tau_secs,
                    this.config.max_price_diff_fraction,
                    this.config.max_tick_gap_secs,
                )?;
                tick.funding.push(accrual);
            }

            Ok(tick)
        })(self);

        match result {
            Ok(tick) => {
                for accrual in &tick.interest {
                    self.emit_event(EventPayload::InterestAccrued(accrual.clone()));
                }
                for accrual in &tick.funding {
                    self.emit_event(EventPayload::FundingAccrued(accrual.clone()));
                }
                Ok(tick)
            }
            Err(e) => {
                self.ledgers = snapshot;
                self.current_time = previous_time;
                Err(e)
            }
        }
    }

    // 10.4.2: liquidation. the engine mutates the live ledgers; any error
    // restores the snapshot so a failed attempt leaves no trace.
    pub fn liquidate(
        &mut self,
        mode: LiquidationMode,
        group: HealthGroupId,
        liquidatee: AccountId,
        liquidator: AccountId,
        amount: Decimal,
    ) -> Result<LiquidationOutcome, CoreError> {
        let snapshot = self.ledgers.clone();
        let outcome = liquidation::liquidate(
            &mut self.ledgers,
            &self.prices,
            &self.config,
            mode,
            group,
            liquidatee,
            liquidator,
            amount,
        );
        match outcome {
            Ok(outcome) => {
                self.emit_event(EventPayload::Liquidation(LiquidationEvent {
                    liquidatee,
                    liquidator,
                    mode: outcome.mode,
                    group: outcome.group,
                    amount: outcome.amount,
                    payment: outcome.payment,
                    insurance_cover: outcome.insurance_cover,
                    fee: outcome.fee,
                    status: outcome.status,
                }));
                if outcome.socialized > Decimal::ZERO {
                    self.emit_event(EventPayload::LossSocialized(LossSocializedEvent {
                        account: liquidatee,
                        amount: outcome.socialized,
                    }));
                }
                Ok(outcome)
            }
            Err(e) => {
                self.ledgers = snapshot;
                Err(e.into())
            }
        }
    }

    // 10.4.3: clock recovery. a gap past the stale fence blocks every later
    // tick, since rejection never advances the accrual clocks. resync moves
    // every product's clock to `now` without accruing; interest and funding
    // over the gap are forfeited.
    pub fn resync(&mut self, now: Timestamp) -> Result<(), CoreError> {
        let mut products: Vec<(ProductId, ProductKind)> = self
            .ledgers
            .products
            .iter()
            .map(|(p, c)| (*p, c.kind))
            .collect();
        products.sort_by_key(|(p, _)| *p);
        for (product, kind) in products {
            match kind {
                ProductKind::Spot => self.ledgers.spot.resync(product, now)?,
                ProductKind::Perp => self.ledgers.perp.resync(product, now)?,
            }
        }
        self.current_time = now;
        Ok(())
    }
}
