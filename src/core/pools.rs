// 10.3: AMM operations. all three are driven by a collaborator on behalf of
// the account: minting and burning move real balances against pool reserves,
// swaps trade against them. every path lands atomically and re-checks initial
// health where risk can increase.

use super::clearinghouse::Clearinghouse;
use super::results::CoreError;
use crate::events::{EventPayload, LpBurnedEvent, LpMintedEvent, LpSwappedEvent};
use crate::pool::{BurnAmount, BurnResult, SwapResult};
use crate::types::{AccountId, CollaboratorId, ProductId, ProductKind, QUOTE_PRODUCT};
use rust_decimal::Decimal;

impl Clearinghouse {
    pub fn mint_lp(
        &mut self,
        collaborator: CollaboratorId,
        account: AccountId,
        product: ProductId,
        base_amount: Decimal,
        quote_low: Decimal,
        quote_high: Decimal,
    ) -> Result<(), CoreError> {
        self.require_collaborator(collaborator)?;
        let kind = self
            .ledgers
            .product(product)
            .ok_or(CoreError::ProductNotFound(product))?
            .kind;
        let oracle = self.prices.get(product);

        let snapshot = self.ledgers.clone();
        let result = (|this: &mut Self| -> Result<Decimal, CoreError> {
            let minted = this.ledgers.pools.mint(
                product,
                account,
                base_amount,
                quote_low,
                quote_high,
                oracle,
            )?;
            match kind {
                ProductKind::Spot => {
                    this.ledgers.spot.apply_delta(product, account, -base_amount)?;
                    this.ledgers
                        .spot
                        .apply_delta(QUOTE_PRODUCT, account, -minted.quote_required)?;
                }
                ProductKind::Perp => {
                    this.ledgers.perp.apply_delta(
                        product,
                        account,
                        -base_amount,
                        -minted.quote_required,
                    )?;
                }
            }
            this.check_initial_health(account)?;
            Ok(minted.quote_required)
        })(self);

        match result {
            Ok(quote_in) => {
                let shares = self.ledgers.pools.shares(product, account);
                self.emit_event(EventPayload::LpMinted(LpMintedEvent {
                    account,
                    product,
                    base_in: base_amount,
                    quote_in,
                    shares,
                }));
                Ok(())
            }
            Err(e) => {
                self.ledgers = snapshot;
                Err(e)
            }
        }
    }

    pub fn burn_lp(
        &mut self,
        collaborator: CollaboratorId,
        account: AccountId,
        product: ProductId,
        amount: BurnAmount,
    ) -> Result<BurnResult, CoreError> {
        self.require_collaborator(collaborator)?;
        let kind = self
            .ledgers
            .product(product)
            .ok_or(CoreError::ProductNotFound(product))?
            .kind;

        let snapshot = self.ledgers.clone();
        let result = (|this: &mut Self| -> Result<BurnResult, CoreError> {
            let burned = this.ledgers.pools.burn(product, account, amount)?;
            match kind {
                ProductKind::Spot => {
                    this.ledgers
                        .spot
                        .apply_delta(product, account, burned.base_out)?;
                    this.ledgers
                        .spot
                        .apply_delta(QUOTE_PRODUCT, account, burned.quote_out)?;
                }
                ProductKind::Perp => {
                    this.ledgers.perp.apply_delta(
                        product,
                        account,
                        burned.base_out,
                        burned.quote_out,
                    )?;
                }
            }
            Ok(burned)
        })(self);

        match result {
            Ok(burned) => {
                self.emit_event(EventPayload::LpBurned(LpBurnedEvent {
                    account,
                    product,
                    shares: burned.shares,
                    base_out: burned.base_out,
                    quote_out: burned.quote_out,
                }));
                Ok(burned)
            }
            Err(e) => {
                self.ledgers = snapshot;
                Err(e)
            }
        }
    }

    // 10.3.1: collaborator-driven swap against the pool. the taker's deltas
    // land on their balances; initial health gates the result.
    #[allow(clippy::too_many_arguments)]
    pub fn swap_lp(
        &mut self,
        collaborator: CollaboratorId,
        account: AccountId,
        product: ProductId,
        max_amount: Decimal,
        limit_price: Decimal,
        size_increment: Decimal,
        spread: Decimal,
    ) -> Result<SwapResult, CoreError> {
        self.require_collaborator(collaborator)?;
        let kind = self
            .ledgers
            .product(product)
            .ok_or(CoreError::ProductNotFound(product))?
            .kind;

        let snapshot = self.ledgers.clone();
        let result = (|this: &mut Self| -> Result<SwapResult, CoreError> {
            let swap = this.ledgers.pools.swap(
                product,
                max_amount,
                limit_price,
                size_increment,
                spread,
            )?;
            match kind {
                ProductKind::Spot => {
                    this.ledgers
                        .spot
                        .apply_delta(product, account, swap.base_delta)?;
                    this.ledgers
                        .spot
                        .apply_delta(QUOTE_PRODUCT, account, swap.quote_delta)?;
                }
                ProductKind::Perp => {
                    this.ledgers.perp.apply_delta(
                        product,
                        account,
                        swap.base_delta,
                        swap.quote_delta,
                    )?;
                }
            }
            this.check_initial_health(account)?;
            Ok(swap)
        })(self);

        match result {
            Ok(swap) => {
                self.emit_event(EventPayload::LpSwapped(LpSwappedEvent {
                    account,
                    product,
                    base_delta: swap.base_delta,
                    quote_delta: swap.quote_delta,
                }));
                Ok(swap)
            }
            Err(e) => {
                self.ledgers = snapshot;
                Err(e)
            }
        }
    }
}
