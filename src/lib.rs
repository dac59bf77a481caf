// clearing-core: cross-margined spot + perpetuals clearing engine.
// risk-first architecture: health math and liquidation take priority.
// all computation is deterministic fixed-point with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ProductId, AccountId, tiers, sentinels
//   2.x  risk.rs: weight curves, spread penalty
//   3.x  interest.rs: normalized spot ledger, borrow interest
//   4.x  funding.rs: perp ledger, cumulative funding, EMA mark
//   5.x  pool.rs: per-product constant-product AMM
//   6.x  state.rs: owned ledger aggregate, health groups, oracle prices
//   7.x  health.rs: per-tier account health, basis netting
//   8.x  liquidation.rs: mode-based liquidation, socialization
//   9.x  events.rs: state transition events for audit
//   10.x core/: clearinghouse: balances, pools, settlement, liquidations
//
// config.rs carries the core-wide knobs; insurance.rs the protocol fund.

pub mod config;
pub mod core;
pub mod events;
pub mod funding;
pub mod health;
pub mod insurance;
pub mod interest;
pub mod liquidation;
pub mod pool;
pub mod risk;
pub mod state;
pub mod types;

// re exports for convenience
pub use config::CoreConfig;
pub use self::core::{BalanceDelta, Clearinghouse, CoreError, TickResult};
pub use events::{Event, EventId, EventPayload};
pub use funding::{FundingAccrual, PerpBalance, PerpLedger};
pub use health::{CoreRisk, GroupDecomposition};
pub use insurance::InsuranceFund;
pub use interest::{InterestAccrual, InterestParams, SpotLedger};
pub use liquidation::{LiquidationOutcome, LiquidationStatus};
pub use pool::{BurnAmount, LpLedger};
pub use risk::RiskParams;
pub use state::{HealthGroup, Ledgers, OraclePrices};
pub use types::{
    AccountId, CollaboratorId, HealthGroupId, HealthTier, LiquidationMode, ProductId, ProductKind,
    Timestamp, QUOTE_PRODUCT,
};
