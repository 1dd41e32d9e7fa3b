//! Position tracking

use super::{
    event_group, ClosedPosition, CloseReason, ExecutionAnomaly, Position, PositionError,
    PositionId, PositionStatus,
};
use crate::config::{duration_from_secs, PositionConfig};
use crate::execution::{IdSequence, IntentKind, TradeIntent};
use crate::fees::FeeCalculator;
use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// Owns every position and the P&L derived from them
///
/// Open positions are kept in id order so iteration is deterministic.
/// Closed positions are retained for the life of the manager.
#[derive(Debug, Clone)]
pub struct PositionManager {
    config: PositionConfig,
    fees: FeeCalculator,
    open: BTreeMap<PositionId, Position>,
    closed: Vec<ClosedPosition>,
    closed_index: HashMap<PositionId, usize>,
    next_id: PositionId,
    /// Retries granted to internally generated exit intents
    exit_retries: u32,
}

impl PositionManager {
    pub fn new(config: PositionConfig, fees: FeeCalculator) -> Self {
        Self {
            config,
            fees,
            open: BTreeMap::new(),
            closed: Vec::new(),
            closed_index: HashMap::new(),
            next_id: 1,
            exit_retries: 0,
        }
    }

    /// Retries granted to exit intents created by [`Self::mark_to_market`]
    pub fn with_exit_retries(mut self, retries: u32) -> Self {
        self.exit_retries = retries;
        self
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// Take-profit and stop-loss YES price levels for an entry
    fn exit_levels(&self, side: Side, entry_price: Decimal) -> (Decimal, Decimal) {
        let contract = side.contract_price(entry_price);
        let tp = (contract * (Decimal::ONE + self.config.take_profit_pct)).min(Decimal::ONE);
        let sl = (contract * (Decimal::ONE - self.config.stop_loss_pct)).max(Decimal::ZERO);
        (side.contract_price(tp), side.contract_price(sl))
    }

    /// Open a position from a filled entry intent
    pub fn open(
        &mut self,
        intent: &TradeIntent,
        fill_price: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Result<Position, PositionError> {
        if !intent.is_entry() {
            return Err(PositionError::NotAnEntry(intent.id));
        }
        if !self.config.multi_position && self.has_open(&intent.market_id) {
            return Err(PositionError::AlreadyOpen(intent.market_id.clone()));
        }

        let (take_profit, stop_loss) = self.exit_levels(intent.side, fill_price);
        let position = Position {
            id: self.next_id,
            intent_id: intent.id,
            market_id: intent.market_id.clone(),
            side: intent.side,
            entry_price: fill_price,
            size: intent.size,
            opened_at,
            take_profit,
            stop_loss,
            entry_fee: self.fees.entry_fee(intent.size, fill_price, intent.side),
            mark_price: fill_price,
            unrealized_pnl: Decimal::ZERO,
            peak_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            exit_pending: false,
            needs_review: false,
            anomalies: Vec::new(),
        };
        self.next_id += 1;

        tracing::info!(
            position_id = position.id,
            market = %position.market_id,
            side = %position.side,
            entry = %position.entry_price,
            size = %position.size,
            take_profit = %position.take_profit,
            stop_loss = %position.stop_loss,
            "Position opened"
        );

        self.open.insert(position.id, position.clone());
        Ok(position)
    }

    /// Close a position and realize its P&L
    ///
    /// Closing twice fails with [`PositionError::AlreadyClosed`] and leaves
    /// the recorded result untouched.
    pub fn close(
        &mut self,
        position_id: PositionId,
        exit_price: Decimal,
        reason: CloseReason,
        closed_at: DateTime<Utc>,
    ) -> Result<ClosedPosition, PositionError> {
        if self.closed_index.contains_key(&position_id) {
            return Err(PositionError::AlreadyClosed(position_id));
        }
        let mut position = self
            .open
            .remove(&position_id)
            .ok_or(PositionError::UnknownPosition(position_id))?;

        let gross_pnl = position.gross_pnl_at(exit_price);
        let exit_fee = self.fees.exit_fee(position.size, exit_price, position.side);
        let fees = position.entry_fee + exit_fee;

        position.status = PositionStatus::Closed;
        position.exit_pending = false;
        position.mark_price = exit_price;
        position.unrealized_pnl = Decimal::ZERO;

        let closed = ClosedPosition {
            position,
            exit_price,
            closed_at,
            reason,
            gross_pnl,
            fees,
            realized_pnl: gross_pnl - fees,
        };

        tracing::info!(
            position_id,
            market = %closed.position.market_id,
            exit = %exit_price,
            reason = %reason,
            realized_pnl = %closed.realized_pnl,
            "Position closed"
        );

        self.closed_index.insert(position_id, self.closed.len());
        self.closed.push(closed.clone());
        Ok(closed)
    }

    /// Revalue a market's open positions and emit exit intents for any that
    /// crossed an exit condition
    pub fn mark_to_market(
        &mut self,
        market_id: &str,
        price: Decimal,
        now: DateTime<Utc>,
        ids: &mut IdSequence,
    ) -> Vec<TradeIntent> {
        let max_holding = self
            .config
            .max_holding_seconds
            .and_then(duration_from_secs);
        let trailing = self
            .config
            .trailing_stop_activation
            .map(|activation| (activation, self.config.trailing_stop_distance));

        let mut exits = Vec::new();
        for position in self.open.values_mut() {
            if position.market_id != market_id {
                continue;
            }
            position.mark_price = price;
            position.unrealized_pnl = position.gross_pnl_at(price);
            position.peak_pnl = position.peak_pnl.max(position.unrealized_pnl);

            if position.exit_pending {
                continue;
            }

            let hit_take_profit = match position.side {
                Side::Yes => price >= position.take_profit,
                Side::No => price <= position.take_profit,
            };
            let hit_stop_loss = match position.side {
                Side::Yes => price <= position.stop_loss,
                Side::No => price >= position.stop_loss,
            };

            let reason = if hit_take_profit {
                Some(CloseReason::TakeProfit)
            } else if hit_stop_loss {
                Some(CloseReason::StopLoss)
            } else if trailing.is_some_and(|(activation, distance)| {
                position.peak_pnl >= activation
                    && position.peak_pnl - position.unrealized_pnl >= distance
            }) {
                Some(CloseReason::TrailingStop)
            } else if max_holding.is_some_and(|limit| now - position.opened_at >= limit) {
                Some(CloseReason::HoldingTimeLimit)
            } else {
                None
            };

            if let Some(reason) = reason {
                position.exit_pending = true;
                tracing::debug!(
                    position_id = position.id,
                    market = market_id,
                    price = %price,
                    reason = %reason,
                    "Exit condition reached"
                );
                exits.push(TradeIntent::exit(
                    ids.next_id(),
                    position.id,
                    &position.market_id,
                    position.side,
                    position.size,
                    price,
                    reason,
                    now,
                    self.exit_retries,
                ));
            }
        }
        exits
    }

    /// Re-arm exit detection after an exit order was abandoned
    pub fn release_exit(&mut self, position_id: PositionId) {
        if let Some(position) = self.open.get_mut(&position_id) {
            position.exit_pending = false;
        }
    }

    /// Mark an exit as outstanding for an intent created outside [`Self::mark_to_market`]
    pub fn claim_exit(&mut self, intent: &TradeIntent) -> bool {
        let IntentKind::Exit { position_id, .. } = intent.kind else {
            return false;
        };
        match self.open.get_mut(&position_id) {
            Some(position) if !position.exit_pending => {
                position.exit_pending = true;
                true
            }
            _ => false,
        }
    }

    fn position_mut(&mut self, position_id: PositionId) -> Option<&mut Position> {
        if self.open.contains_key(&position_id) {
            return self.open.get_mut(&position_id);
        }
        let index = *self.closed_index.get(&position_id)?;
        self.closed.get_mut(index).map(|c| &mut c.position)
    }

    /// Attach an anomaly to an open or closed position
    pub fn record_anomaly(
        &mut self,
        position_id: PositionId,
        anomaly: ExecutionAnomaly,
    ) -> Result<(), PositionError> {
        let position = self
            .position_mut(position_id)
            .ok_or(PositionError::UnknownPosition(position_id))?;
        position.anomalies.push(anomaly);
        Ok(())
    }

    pub fn flag_for_review(&mut self, position_id: PositionId) -> Result<(), PositionError> {
        let position = self
            .position_mut(position_id)
            .ok_or(PositionError::UnknownPosition(position_id))?;
        position.needs_review = true;
        Ok(())
    }

    pub fn get(&self, position_id: PositionId) -> Option<&Position> {
        self.open.get(&position_id).or_else(|| {
            self.closed_index
                .get(&position_id)
                .and_then(|i| self.closed.get(*i))
                .map(|c| &c.position)
        })
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    pub fn closed_positions(&self) -> &[ClosedPosition] {
        &self.closed
    }

    pub fn closed_position(&self, position_id: PositionId) -> Option<&ClosedPosition> {
        self.closed_index
            .get(&position_id)
            .and_then(|i| self.closed.get(*i))
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn has_open(&self, market_id: &str) -> bool {
        self.open.values().any(|p| p.market_id == market_id)
    }

    /// Capital committed across open positions
    pub fn total_exposure(&self) -> Decimal {
        self.open.values().map(Position::exposure).sum()
    }

    /// Capital committed within one correlation group
    pub fn event_exposure(&self, group: &str) -> Decimal {
        self.open
            .values()
            .filter(|p| event_group(&p.market_id) == group)
            .map(Position::exposure)
            .sum()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.closed.iter().map(|c| c.realized_pnl).sum()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.open.values().map(|p| p.unrealized_pnl).sum()
    }

    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl() + self.unrealized_pnl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeConfig;
    use crate::execution::RetryState;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 14, 0, 0).unwrap()
    }

    fn manager(config: PositionConfig) -> PositionManager {
        PositionManager::new(config, FeeCalculator::new(FeeConfig::free()))
    }

    fn default_manager() -> PositionManager {
        manager(PositionConfig {
            take_profit_pct: dec!(0.10),
            stop_loss_pct: dec!(0.05),
            max_holding_seconds: None,
            ..PositionConfig::default()
        })
    }

    fn entry(id: u64, market: &str, side: Side, price: Decimal) -> TradeIntent {
        TradeIntent {
            id,
            market_id: market.to_string(),
            side,
            size: dec!(100),
            reference_price: price,
            signal: None,
            created_at: t0(),
            kind: IntentKind::Entry,
            retry: RetryState::new(0),
        }
    }

    #[test]
    fn test_open_position() {
        let mut positions = default_manager();
        let position = positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();

        assert_eq!(position.id, 1);
        assert_eq!(position.take_profit, dec!(0.55));
        assert_eq!(position.stop_loss, dec!(0.475));
        assert_eq!(positions.open_count(), 1);
        assert_eq!(positions.total_exposure(), dec!(50));
    }

    #[test]
    fn test_no_side_levels_mirror() {
        let mut positions = default_manager();
        let position = positions
            .open(&entry(1, "KXBTC", Side::No, dec!(0.60)), dec!(0.60), t0())
            .unwrap();
        // No contract at 0.40: target 0.44, stop 0.38
        assert_eq!(position.take_profit, dec!(0.56));
        assert_eq!(position.stop_loss, dec!(0.62));
        assert_eq!(position.exposure(), dec!(40));
    }

    #[test]
    fn test_single_position_per_market() {
        let mut positions = default_manager();
        positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();
        let err = positions
            .open(&entry(2, "KXBTC", Side::No, dec!(0.50)), dec!(0.50), t0())
            .unwrap_err();
        assert_eq!(err, PositionError::AlreadyOpen("KXBTC".to_string()));

        let mut multi = manager(PositionConfig {
            multi_position: true,
            ..PositionConfig::default()
        });
        multi
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();
        assert!(multi
            .open(&entry(2, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .is_ok());
    }

    #[test]
    fn test_close_yes_profit() {
        let mut positions = default_manager();
        let p = positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();

        let closed = positions
            .close(p.id, dec!(0.60), CloseReason::TakeProfit, t0())
            .unwrap();
        assert_eq!(closed.realized_pnl, dec!(10));
        assert_eq!(closed.position.status, PositionStatus::Closed);
        assert_eq!(positions.open_count(), 0);
        assert_eq!(positions.realized_pnl(), dec!(10));
    }

    #[test]
    fn test_close_no_profit() {
        let mut positions = default_manager();
        let p = positions
            .open(&entry(1, "KXBTC", Side::No, dec!(0.50)), dec!(0.50), t0())
            .unwrap();
        let closed = positions
            .close(p.id, dec!(0.40), CloseReason::TakeProfit, t0())
            .unwrap();
        assert_eq!(closed.realized_pnl, dec!(10));
    }

    #[test]
    fn test_close_with_fees() {
        let mut positions =
            PositionManager::new(PositionConfig::default(), FeeCalculator::new(FeeConfig::default()));
        let p = positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();
        assert_eq!(p.entry_fee, dec!(1.75));

        let closed = positions
            .close(p.id, dec!(0.40), CloseReason::StopLoss, t0())
            .unwrap();
        // -10 gross, 1.75 entry, 0.07 * 24 = 1.68 exit
        assert_eq!(closed.fees, dec!(3.43));
        assert_eq!(closed.realized_pnl, dec!(-13.43));
        assert!(closed.is_loss());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut positions = default_manager();
        let p = positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();
        positions
            .close(p.id, dec!(0.60), CloseReason::TakeProfit, t0())
            .unwrap();

        let err = positions
            .close(p.id, dec!(0.10), CloseReason::StopLoss, t0())
            .unwrap_err();
        assert_eq!(err, PositionError::AlreadyClosed(p.id));
        assert_eq!(positions.realized_pnl(), dec!(10));
        assert_eq!(positions.closed_positions().len(), 1);
    }

    #[test]
    fn test_close_unknown() {
        let mut positions = default_manager();
        let err = positions
            .close(42, dec!(0.5), CloseReason::External, t0())
            .unwrap_err();
        assert_eq!(err, PositionError::UnknownPosition(42));
    }

    #[test]
    fn test_mark_to_market_updates_pnl() {
        let mut positions = default_manager();
        let mut ids = IdSequence::new();
        let p = positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();

        let exits = positions.mark_to_market("KXBTC", dec!(0.52), t0(), &mut ids);
        assert!(exits.is_empty());
        assert_eq!(positions.get(p.id).unwrap().unrealized_pnl, dec!(2));
        assert_eq!(positions.total_pnl(), dec!(2));

        // Other markets leave the position alone
        positions.mark_to_market("OTHER", dec!(0.90), t0(), &mut ids);
        assert_eq!(positions.get(p.id).unwrap().unrealized_pnl, dec!(2));
    }

    #[test]
    fn test_take_profit_exit_emitted_once() {
        let mut positions = default_manager();
        let mut ids = IdSequence::new();
        let p = positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();

        let exits = positions.mark_to_market("KXBTC", dec!(0.56), t0(), &mut ids);
        assert_eq!(exits.len(), 1);
        assert_eq!(
            exits[0].kind,
            IntentKind::Exit {
                position_id: p.id,
                reason: CloseReason::TakeProfit
            }
        );
        assert!(positions
            .mark_to_market("KXBTC", dec!(0.57), t0(), &mut ids)
            .is_empty());

        positions.release_exit(p.id);
        assert_eq!(
            positions
                .mark_to_market("KXBTC", dec!(0.57), t0(), &mut ids)
                .len(),
            1
        );
    }

    #[test]
    fn test_stop_loss_exit_for_no_side() {
        let mut positions = default_manager();
        let mut ids = IdSequence::new();
        positions
            .open(&entry(1, "KXBTC", Side::No, dec!(0.60)), dec!(0.60), t0())
            .unwrap();
        let exits = positions.mark_to_market("KXBTC", dec!(0.63), t0(), &mut ids);
        assert_eq!(exits.len(), 1);
        assert!(matches!(
            exits[0].kind,
            IntentKind::Exit {
                reason: CloseReason::StopLoss,
                ..
            }
        ));
    }

    #[test]
    fn test_holding_time_limit() {
        let mut positions = manager(PositionConfig {
            max_holding_seconds: Some(60),
            ..PositionConfig::default()
        });
        let mut ids = IdSequence::new();
        positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();

        assert!(positions
            .mark_to_market("KXBTC", dec!(0.50), t0() + Duration::seconds(59), &mut ids)
            .is_empty());
        let exits =
            positions.mark_to_market("KXBTC", dec!(0.50), t0() + Duration::seconds(60), &mut ids);
        assert!(matches!(
            exits[0].kind,
            IntentKind::Exit {
                reason: CloseReason::HoldingTimeLimit,
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_holding_limit_is_unbounded() {
        let mut positions = manager(PositionConfig {
            max_holding_seconds: Some(u64::MAX),
            ..PositionConfig::default()
        });
        let mut ids = IdSequence::new();
        positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();

        assert!(positions
            .mark_to_market("KXBTC", dec!(0.50), t0() + Duration::days(3650), &mut ids)
            .is_empty());
    }

    #[test]
    fn test_trailing_stop() {
        let mut positions = manager(PositionConfig {
            take_profit_pct: dec!(0.5),
            stop_loss_pct: dec!(0.5),
            max_holding_seconds: None,
            trailing_stop_activation: Some(dec!(5)),
            trailing_stop_distance: dec!(2.5),
            ..PositionConfig::default()
        });
        let mut ids = IdSequence::new();
        positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();

        // +6 arms the stop, +4 gives back only 2
        assert!(positions
            .mark_to_market("KXBTC", dec!(0.56), t0(), &mut ids)
            .is_empty());
        assert!(positions
            .mark_to_market("KXBTC", dec!(0.54), t0(), &mut ids)
            .is_empty());
        // 6 -> 3 gives back 3 >= 2.5
        let exits = positions.mark_to_market("KXBTC", dec!(0.53), t0(), &mut ids);
        assert!(matches!(
            exits[0].kind,
            IntentKind::Exit {
                reason: CloseReason::TrailingStop,
                ..
            }
        ));
    }

    #[test]
    fn test_anomaly_on_closed_position() {
        let mut positions = default_manager();
        let p = positions
            .open(&entry(1, "KXBTC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();
        positions
            .close(p.id, dec!(0.50), CloseReason::External, t0())
            .unwrap();

        positions
            .record_anomaly(
                p.id,
                ExecutionAnomaly::SettlementTimeout {
                    closed_at: t0(),
                    deadline: t0(),
                },
            )
            .unwrap();
        positions.flag_for_review(p.id).unwrap();

        let closed = positions.closed_position(p.id).unwrap();
        assert!(closed.position.needs_review);
        assert_eq!(closed.position.anomalies.len(), 1);
        assert_eq!(positions.flag_for_review(99), Err(PositionError::UnknownPosition(99)));
    }

    #[test]
    fn test_event_exposure() {
        let mut positions = default_manager();
        positions
            .open(&entry(1, "KX-INFL-DEC", Side::Yes, dec!(0.50)), dec!(0.50), t0())
            .unwrap();
        positions
            .open(&entry(2, "KX-INFL-JAN", Side::Yes, dec!(0.20)), dec!(0.20), t0())
            .unwrap();
        positions
            .open(&entry(3, "NBA-LAL", Side::Yes, dec!(0.30)), dec!(0.30), t0())
            .unwrap();

        assert_eq!(positions.event_exposure("KX-INFL"), dec!(70));
        assert_eq!(positions.event_exposure("NBA"), dec!(30));
        assert_eq!(positions.total_exposure(), dec!(100));
    }
}
