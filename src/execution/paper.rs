//! Paper trading executor and account

use super::{BalanceProvider, ExecutionOutcome, FillEvent, OrderExecutor, TradeIntent};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Executor that fills every intent at its reference price
///
/// Fill timestamps are the intent's creation time, which keeps paper runs
/// reproducible.
#[derive(Debug, Clone, Default)]
pub struct PaperExecutor {
    fills: Arc<RwLock<Vec<FillEvent>>>,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fill produced so far
    pub async fn fills(&self) -> Vec<FillEvent> {
        self.fills.read().await.clone()
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn submit(&self, intent: &TradeIntent) -> anyhow::Result<ExecutionOutcome> {
        let outcome = ExecutionOutcome::Filled {
            price: intent.reference_price,
            timestamp: intent.created_at,
        };
        self.fills.write().await.push(FillEvent {
            intent_id: intent.id,
            outcome: outcome.clone(),
        });

        tracing::info!(
            intent_id = intent.id,
            market = %intent.market_id,
            side = %intent.side,
            price = %intent.reference_price,
            size = %intent.size,
            "Paper order filled"
        );
        Ok(outcome)
    }
}

/// Paper account balance
#[derive(Debug, Clone)]
pub struct PaperBalance {
    balance: Arc<RwLock<Decimal>>,
}

impl PaperBalance {
    pub fn new(initial: Decimal) -> Self {
        Self {
            balance: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn set(&self, balance: Decimal) {
        *self.balance.write().await = balance;
    }
}

#[async_trait]
impl BalanceProvider for PaperBalance {
    async fn available_balance(&self) -> anyhow::Result<Decimal> {
        Ok(*self.balance.read().await)
    }
}
