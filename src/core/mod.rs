// 10.0: the clearing core. coordinates products, balances, AMM pools, health
// checks, settlement, accrual ticks, and liquidations behind one struct.
// deterministic and event-driven with no external I/O; every mutating
// operation commits atomically or leaves no trace.

mod balances;
mod clearinghouse;
mod pools;
mod results;
mod risk_ops;

pub use balances::BalanceDelta;
pub use clearinghouse::Clearinghouse;
pub use results::{CoreError, TickResult};
