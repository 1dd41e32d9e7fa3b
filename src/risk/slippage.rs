//! Fill slippage measurement

use crate::execution::TradeIntent;
use rust_decimal::Decimal;

/// Adverse deviation of a fill from the intended price, as a fraction
///
/// Measured on the traded contract's price: paying more on an entry or
/// receiving less on an exit is positive. Favourable fills are negative.
pub fn adverse_slippage(intent: &TradeIntent, fill_price: Decimal) -> Decimal {
    let intended = intent.side.contract_price(intent.reference_price);
    if intended.is_zero() {
        return Decimal::ZERO;
    }
    let filled = intent.side.contract_price(fill_price);
    if intent.is_entry() {
        (filled - intended) / intended
    } else {
        (intended - filled) / intended
    }
}

/// Running slippage statistics
#[derive(Debug, Clone, Default)]
pub struct SlippageStats {
    pub fills: u64,
    pub violations: u64,
    pub total_adverse: Decimal,
    pub worst: Decimal,
}

impl SlippageStats {
    pub fn record(&mut self, slippage: Decimal, violation: bool) {
        self.fills += 1;
        self.total_adverse += slippage;
        self.worst = self.worst.max(slippage);
        if violation {
            self.violations += 1;
        }
    }

    pub fn average(&self) -> Decimal {
        if self.fills == 0 {
            Decimal::ZERO
        } else {
            self.total_adverse / Decimal::from(self.fills)
        }
    }
}
