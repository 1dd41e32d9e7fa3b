//! Simulated fill pricing

use super::FillTiming;
use crate::config::BacktestConfig;
use crate::execution::TradeIntent;
use rust_decimal::Decimal;

/// Prices simulated fills with adverse slippage
///
/// Slippage is applied to the traded contract's price: entries pay more,
/// exits receive less.
#[derive(Debug, Clone)]
pub struct FillModel {
    timing: FillTiming,
    slippage_pct: Decimal,
}

impl FillModel {
    pub fn new(timing: FillTiming, slippage_pct: Decimal) -> Self {
        Self {
            timing,
            slippage_pct,
        }
    }

    pub fn from_config(config: &BacktestConfig) -> Self {
        Self::new(config.fill_timing, config.slippage_pct)
    }

    pub fn timing(&self) -> FillTiming {
        self.timing
    }

    /// YES fill price for `intent` when the market trades at `market_price`
    pub fn fill_price(&self, intent: &TradeIntent, market_price: Decimal) -> Decimal {
        if self.slippage_pct.is_zero() {
            return market_price;
        }
        let contract = intent.side.contract_price(market_price);
        let factor = if intent.is_entry() {
            Decimal::ONE + self.slippage_pct
        } else {
            Decimal::ONE - self.slippage_pct
        };
        let filled = (contract * factor).clamp(Decimal::ZERO, Decimal::ONE);
        intent.side.contract_price(filled)
    }
}
