//! Trading fee model
//!
//! A pure function of size, price, side and schedule. The live engine and
//! the backtester share this module so both see identical costs.

use crate::config::FeeConfig;
use crate::signal::Side;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fee formula family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeModel {
    /// rate × contracts × P × (1 − P), rounded up to the cent
    #[default]
    Kalshi,
    /// rate × notional
    Flat,
    /// No trading fees
    None,
}

/// Liquidity role of our orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    #[default]
    Taker,
    Maker,
}

/// Fee quote for a single fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fee {
    /// Fee if the order rests and is filled as maker
    pub maker_fee: Decimal,
    /// Fee if the order crosses the book
    pub taker_fee: Decimal,
    /// Fee charged when the contract settles
    pub settlement_fee: Decimal,
}

impl Fee {
    /// Trading fee for the given liquidity role
    pub fn trading(&self, liquidity: Liquidity) -> Decimal {
        match liquidity {
            Liquidity::Taker => self.taker_fee,
            Liquidity::Maker => self.maker_fee,
        }
    }
}

/// Profit and loss of a full round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlBreakdown {
    pub gross: Decimal,
    pub entry_fee: Decimal,
    pub exit_fee: Decimal,
    pub net: Decimal,
    /// Net P&L over capital committed at entry
    pub return_pct: Decimal,
}

impl PnlBreakdown {
    pub fn total_fees(&self) -> Decimal {
        self.entry_fee + self.exit_fee
    }
}

fn ceil_to_cent(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::AwayFromZero)
}

/// Quote fees for `size` contracts of `side` with the market's YES price at `price`
pub fn compute(size: Decimal, price: Decimal, side: Side, schedule: &FeeConfig) -> Fee {
    if size <= Decimal::ZERO {
        return Fee::default();
    }
    let contract = side.contract_price(price).clamp(Decimal::ZERO, Decimal::ONE);
    let notional = size * contract;

    let (maker_fee, taker_fee) = match schedule.model {
        FeeModel::Kalshi => {
            let variance = size * contract * (Decimal::ONE - contract);
            (
                ceil_to_cent(schedule.maker_rate * variance),
                ceil_to_cent(schedule.taker_rate * variance),
            )
        }
        FeeModel::Flat => (schedule.maker_rate * notional, schedule.taker_rate * notional),
        FeeModel::None => (Decimal::ZERO, Decimal::ZERO),
    };

    Fee {
        maker_fee,
        taker_fee,
        settlement_fee: schedule.settlement_rate * notional,
    }
}

/// Fee calculator bound to one schedule
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    schedule: FeeConfig,
}

impl FeeCalculator {
    pub fn new(schedule: FeeConfig) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeConfig {
        &self.schedule
    }

    pub fn compute(&self, size: Decimal, price: Decimal, side: Side) -> Fee {
        compute(size, price, side, &self.schedule)
    }

    /// Fee paid to open a position
    pub fn entry_fee(&self, size: Decimal, price: Decimal, side: Side) -> Decimal {
        self.compute(size, price, side)
            .trading(self.schedule.liquidity)
    }

    /// Fee paid to close a position, settlement included
    pub fn exit_fee(&self, size: Decimal, price: Decimal, side: Side) -> Decimal {
        let fee = self.compute(size, price, side);
        fee.trading(self.schedule.liquidity) + fee.settlement_fee
    }

    /// P&L of entering and exiting at the given YES prices
    pub fn round_trip(&self, entry: Decimal, exit: Decimal, size: Decimal, side: Side) -> PnlBreakdown {
        let gross = match side {
            Side::Yes => (exit - entry) * size,
            Side::No => (entry - exit) * size,
        };
        let entry_fee = self.entry_fee(size, entry, side);
        let exit_fee = self.exit_fee(size, exit, side);
        let net = gross - entry_fee - exit_fee;
        let committed = size * side.contract_price(entry);
        let return_pct = if committed.is_zero() {
            Decimal::ZERO
        } else {
            net / committed
        };

        PnlBreakdown {
            gross,
            entry_fee,
            exit_fee,
            net,
            return_pct,
        }
    }

    /// YES price at which a take-profit exit would trigger
    pub fn target_exit_price(price: Decimal, side: Side, take_profit_pct: Decimal) -> Decimal {
        let target = (side.contract_price(price) * (Decimal::ONE + take_profit_pct)).min(Decimal::ONE);
        side.contract_price(target)
    }

    /// Net P&L if the position is exited at its take-profit level
    pub fn expected_edge(
        &self,
        size: Decimal,
        price: Decimal,
        side: Side,
        take_profit_pct: Decimal,
    ) -> Decimal {
        let exit = Self::target_exit_price(price, side, take_profit_pct);
        self.round_trip(price, exit, size, side).net
    }

    /// Least favourable YES exit price that still nets a non-negative P&L
    ///
    /// Returns `None` when no exit price can cover the fees.
    pub fn breakeven_exit_price(&self, entry: Decimal, size: Decimal, side: Side) -> Option<Decimal> {
        let (mut losing, mut winning) = match side {
            Side::Yes => (entry, Decimal::ONE),
            Side::No => (entry, Decimal::ZERO),
        };
        if self.round_trip(entry, winning, size, side).net < Decimal::ZERO {
            return None;
        }
        if self.round_trip(entry, losing, size, side).net >= Decimal::ZERO {
            return Some(entry);
        }

        for _ in 0..48 {
            let mid = (losing + winning) / dec!(2);
            if self.round_trip(entry, mid, size, side).net >= Decimal::ZERO {
                winning = mid;
            } else {
                losing = mid;
            }
        }
        let strategy = match side {
            Side::Yes => RoundingStrategy::ToPositiveInfinity,
            Side::No => RoundingStrategy::ToNegativeInfinity,
        };
        Some(winning.round_dp_with_strategy(4, strategy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kalshi() -> FeeCalculator {
        FeeCalculator::new(FeeConfig::default())
    }

    #[test]
    fn test_kalshi_taker_fee() {
        // 0.07 * 100 * 0.65 * 0.35 = 1.5925, rounded up to 1.60
        let fee = kalshi().compute(dec!(100), dec!(0.65), Side::Yes);
        assert_eq!(fee.taker_fee, dec!(1.60));
        // 0.0175 * 22.75 = 0.398125, rounded up to 0.40
        assert_eq!(fee.maker_fee, dec!(0.40));
        assert_eq!(fee.settlement_fee, dec!(0));
    }

    #[test]
    fn test_kalshi_fee_symmetric_in_side() {
        let calc = kalshi();
        let yes = calc.compute(dec!(40), dec!(0.30), Side::Yes);
        let no = calc.compute(dec!(40), dec!(0.30), Side::No);
        assert_eq!(yes.taker_fee, no.taker_fee);
    }

    #[test]
    fn test_kalshi_small_fee_rounds_up_to_a_cent() {
        let fee = kalshi().compute(dec!(1), dec!(0.99), Side::Yes);
        // 0.07 * 0.0099 = 0.000693
        assert_eq!(fee.taker_fee, dec!(0.01));
    }

    #[test]
    fn test_flat_fee_uses_contract_price() {
        let schedule = FeeConfig {
            model: FeeModel::Flat,
            taker_rate: dec!(0.01),
            maker_rate: dec!(0),
            settlement_rate: dec!(0.005),
            liquidity: Liquidity::Taker,
        };
        let fee = compute(dec!(100), dec!(0.70), Side::No, &schedule);
        // No contract costs 0.30, notional 30
        assert_eq!(fee.taker_fee, dec!(0.30));
        assert_eq!(fee.settlement_fee, dec!(0.15));
    }

    #[test]
    fn test_zero_size_is_free() {
        let fee = kalshi().compute(dec!(0), dec!(0.5), Side::Yes);
        assert_eq!(fee, Fee::default());
    }

    #[test]
    fn test_round_trip_yes_and_no() {
        let calc = FeeCalculator::new(FeeConfig::free());

        let yes = calc.round_trip(dec!(0.50), dec!(0.60), dec!(100), Side::Yes);
        assert_eq!(yes.gross, dec!(10));
        assert_eq!(yes.net, dec!(10));
        assert_eq!(yes.return_pct, dec!(0.2));

        let no = calc.round_trip(dec!(0.50), dec!(0.60), dec!(100), Side::No);
        assert_eq!(no.gross, dec!(-10));
    }

    #[test]
    fn test_round_trip_includes_fees() {
        let calc = kalshi();
        let pnl = calc.round_trip(dec!(0.50), dec!(0.60), dec!(100), Side::Yes);
        // entry 0.07 * 25 = 1.75, exit 0.07 * 24 = 1.68
        assert_eq!(pnl.entry_fee, dec!(1.75));
        assert_eq!(pnl.exit_fee, dec!(1.68));
        assert_eq!(pnl.net, dec!(6.57));
        assert_eq!(pnl.total_fees(), dec!(3.43));
    }

    #[test]
    fn test_target_exit_price() {
        assert_eq!(
            FeeCalculator::target_exit_price(dec!(0.50), Side::Yes, dec!(0.10)),
            dec!(0.55)
        );
        // No contract at 0.40 targets 0.44, i.e. YES at 0.56
        assert_eq!(
            FeeCalculator::target_exit_price(dec!(0.60), Side::No, dec!(0.10)),
            dec!(0.56)
        );
    }

    #[test]
    fn test_expected_edge_sign() {
        let calc = kalshi();
        // Tiny target: fees dominate
        assert!(calc.expected_edge(dec!(10), dec!(0.50), Side::Yes, dec!(0.01)) < dec!(0));
        // Wide target: gain covers fees
        assert!(calc.expected_edge(dec!(100), dec!(0.50), Side::Yes, dec!(0.20)) > dec!(0));
    }

    #[test]
    fn test_breakeven_exit_price() {
        let calc = kalshi();
        let yes = calc
            .breakeven_exit_price(dec!(0.50), dec!(100), Side::Yes)
            .unwrap();
        assert!(yes > dec!(0.50) && yes < dec!(0.55));
        let pnl = calc.round_trip(dec!(0.50), yes, dec!(100), Side::Yes);
        assert!(pnl.net >= dec!(0));

        let no = calc
            .breakeven_exit_price(dec!(0.50), dec!(100), Side::No)
            .unwrap();
        assert!(no < dec!(0.50) && no > dec!(0.45));

        let free = FeeCalculator::new(FeeConfig::free());
        assert_eq!(
            free.breakeven_exit_price(dec!(0.42), dec!(10), Side::Yes),
            Some(dec!(0.42))
        );
    }
}
