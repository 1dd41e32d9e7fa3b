//! Execution module
//!
//! Contracts toward the order-submission and balance collaborators, plus
//! the paper implementations used for dry runs and tests.

mod paper;
mod types;

pub use paper::{PaperBalance, PaperExecutor};
pub use types::{
    CloseEvent, ExecutionOutcome, FillEvent, IdSequence, IntentId, IntentKind, RetryState,
    TradeIntent,
};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Submits orders to a venue
///
/// An `Err` is treated by the engine like a rejection.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn submit(&self, intent: &TradeIntent) -> anyhow::Result<ExecutionOutcome>;
}

/// Reports the account's spendable balance
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn available_balance(&self) -> anyhow::Result<Decimal>;
}
