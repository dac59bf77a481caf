// 9.0: every committed state change produces an event. used for audit trails,
// state reconstruction, and notifying external systems. the EventPayload enum
// lists all event types.

use crate::funding::FundingAccrual;
use crate::interest::InterestAccrual;
use crate::liquidation::LiquidationStatus;
use crate::types::{AccountId, HealthGroupId, LiquidationMode, ProductId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Balance events
    Deposit(DepositEvent),
    Withdrawal(WithdrawalEvent),
    DeltasApplied(DeltasAppliedEvent),

    // Accrual events
    InterestAccrued(InterestAccrual),
    FundingAccrued(FundingAccrual),

    // Pool events
    LpMinted(LpMintedEvent),
    LpBurned(LpBurnedEvent),
    LpSwapped(LpSwappedEvent),

    // Risk events
    PnlSettled(PnlSettledEvent),
    Liquidation(LiquidationEvent),
    LossSocialized(LossSocializedEvent),
    InsuranceDeposit(InsuranceDepositEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub account: AccountId,
    pub product: ProductId,
    pub amount: Decimal,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub account: AccountId,
    pub product: ProductId,
    pub amount: Decimal,
    pub new_balance: Decimal,
}

/// A batch of signed balance deltas pushed by a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltasAppliedEvent {
    pub collaborator: u32,
    pub accounts_touched: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpMintedEvent {
    pub account: AccountId,
    pub product: ProductId,
    pub base_in: Decimal,
    pub quote_in: Decimal,
    pub shares: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpBurnedEvent {
    pub account: AccountId,
    pub product: ProductId,
    pub shares: Decimal,
    pub base_out: Decimal,
    pub quote_out: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpSwappedEvent {
    pub account: AccountId,
    pub product: ProductId,
    pub base_delta: Decimal,
    pub quote_delta: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlSettledEvent {
    pub account: AccountId,
    pub product: ProductId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub liquidatee: AccountId,
    pub liquidator: AccountId,
    pub mode: LiquidationMode,
    pub group: HealthGroupId,
    pub amount: Decimal,
    pub payment: Decimal,
    pub insurance_cover: Decimal,
    pub fee: Decimal,
    pub status: Option<LiquidationStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossSocializedEvent {
    pub account: AccountId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceDepositEvent {
    pub from: AccountId,
    pub amount: Decimal,
    pub new_balance: Decimal,
}

// 9.1: bounded in-memory collector. oldest events fall off the front once the
// cap is hit; external systems that need the full stream drain it themselves.
#[derive(Debug, Clone)]
pub struct EventCollector {
    events: VecDeque<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventCollector {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 1,
            max_events,
        }
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push_back(Event::new(id, timestamp, payload));
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
        id
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
