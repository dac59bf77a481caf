// 10.0.2: result types and errors for core operations.

use crate::funding::{FundingAccrual, PerpError};
use crate::interest::{InterestAccrual, SpotError};
use crate::liquidation::LiquidationError;
use crate::pool::PoolError;
use crate::risk::RiskConfigError;
use crate::state::GroupError;
use crate::types::{AccountId, CollaboratorId, ProductId};
use rust_decimal::Decimal;

/// What one clock tick accrued across all products.
#[derive(Debug, Clone, Default)]
pub struct TickResult {
    pub interest: Vec<InterestAccrual>,
    pub funding: Vec<FundingAccrual>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("collaborator {0:?} is not registered")]
    Unauthorized(CollaboratorId),

    #[error("product {0:?} not found")]
    ProductNotFound(ProductId),

    #[error("product {0:?} has the wrong kind for this operation")]
    WrongProductKind(ProductId),

    #[error("amount must be positive and nonzero")]
    InvalidAmount,

    #[error("insufficient balance for {account:?}: requested {requested}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        requested: Decimal,
        available: Decimal,
    },

    #[error("operation would leave {account:?} below required health: {health}")]
    HealthViolation { account: AccountId, health: Decimal },

    #[error("settlement exceeds product budget: requested {requested}, available {available}")]
    SettlementBudgetExceeded {
        requested: Decimal,
        available: Decimal,
    },

    #[error("risk configuration: {0}")]
    Risk(#[from] RiskConfigError),

    #[error(transparent)]
    Spot(#[from] SpotError),

    #[error(transparent)]
    Perp(#[from] PerpError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Liquidation(#[from] LiquidationError),
}
