//! Backtest analytics and reporting

use crate::engine::DecisionRecord;
use crate::execution::IntentKind;
use crate::position::ClosedPosition;
use crate::risk::RiskState;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account equity after a sample was processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// Summary statistics from a backtest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub initial_capital: Decimal,
    pub final_equity: Decimal,
    /// P&L before fees
    pub total_pnl: Decimal,
    /// P&L after fees
    pub net_pnl: Decimal,
    pub fees_paid: Decimal,
    /// Net P&L over initial capital
    pub return_pct: Decimal,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: Decimal,
    /// Gross wins over gross losses; `None` without losses
    pub profit_factor: Option<Decimal>,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub max_drawdown: Decimal,
    /// Drawdown as a fraction of peak equity
    pub max_drawdown_pct: Decimal,
    /// Mean over standard deviation of per-trade returns
    pub sharpe_ratio: Decimal,
    pub max_consecutive_losses: usize,
    pub avg_holding_secs: i64,
    pub samples_processed: usize,
    pub signals_accepted: usize,
    pub signals_rejected: usize,
    /// Rejected entries by reason code
    pub rejections: BTreeMap<String, usize>,
    /// Trades carrying an execution anomaly
    pub anomalies: usize,
}

/// Complete backtest results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub summary: BacktestSummary,
    pub trades: Vec<ClosedPosition>,
    pub decisions: Vec<DecisionRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_risk: RiskState,
}

impl BacktestSummary {
    pub fn compute(
        initial_capital: Decimal,
        trades: &[ClosedPosition],
        decisions: &[DecisionRecord],
        equity_curve: &[EquityPoint],
        samples_processed: usize,
    ) -> Self {
        let mut summary = Self {
            initial_capital,
            final_equity: equity_curve.last().map_or(initial_capital, |p| p.equity),
            total_trades: trades.len(),
            samples_processed,
            ..Self::default()
        };

        summary.add_trade_stats(trades);
        summary.add_decision_stats(decisions);
        summary.add_drawdown(initial_capital, equity_curve);

        if !initial_capital.is_zero() {
            summary.return_pct = summary.net_pnl / initial_capital;
        }
        summary
    }

    fn add_trade_stats(&mut self, trades: &[ClosedPosition]) {
        let mut gross_wins = Decimal::ZERO;
        let mut gross_losses = Decimal::ZERO;
        let mut streak = 0usize;
        let mut holding = 0i64;

        for trade in trades {
            self.total_pnl += trade.gross_pnl;
            self.net_pnl += trade.realized_pnl;
            self.fees_paid += trade.fees;
            holding += trade.holding_seconds();
            if !trade.position.anomalies.is_empty() {
                self.anomalies += 1;
            }

            if trade.realized_pnl > Decimal::ZERO {
                self.winning_trades += 1;
                gross_wins += trade.realized_pnl;
                self.largest_win = self.largest_win.max(trade.realized_pnl);
                streak = 0;
            } else if trade.is_loss() {
                self.losing_trades += 1;
                gross_losses += -trade.realized_pnl;
                self.largest_loss = self.largest_loss.min(trade.realized_pnl);
                streak += 1;
                self.max_consecutive_losses = self.max_consecutive_losses.max(streak);
            }
        }

        if trades.is_empty() {
            return;
        }
        let n = Decimal::from(trades.len());
        self.win_rate = Decimal::from(self.winning_trades) / n;
        self.avg_holding_secs = holding / trades.len() as i64;
        if self.winning_trades > 0 {
            self.avg_win = gross_wins / Decimal::from(self.winning_trades);
        }
        if self.losing_trades > 0 {
            self.avg_loss = -gross_losses / Decimal::from(self.losing_trades);
            self.profit_factor = Some(gross_wins / gross_losses);
        }
        self.sharpe_ratio = sharpe(trades);
    }

    fn add_decision_stats(&mut self, decisions: &[DecisionRecord]) {
        for record in decisions.iter().filter(|d| d.kind == IntentKind::Entry) {
            match record.reject_reason() {
                None => self.signals_accepted += 1,
                Some(reason) => {
                    self.signals_rejected += 1;
                    *self.rejections.entry(reason.code().to_string()).or_default() += 1;
                }
            }
        }
    }

    fn add_drawdown(&mut self, initial_capital: Decimal, equity_curve: &[EquityPoint]) {
        let mut peak = initial_capital;
        for point in equity_curve {
            peak = peak.max(point.equity);
            let drawdown = peak - point.equity;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
                if peak > Decimal::ZERO {
                    self.max_drawdown_pct = drawdown / peak;
                }
            }
        }
    }

    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        let profit_factor = self
            .profit_factor
            .map_or_else(|| "n/a".to_string(), |pf| format!("{:.2}", pf));
        let rejections = if self.rejections.is_empty() {
            "  none".to_string()
        } else {
            self.rejections
                .iter()
                .map(|(code, count)| format!("  {:<26}{}", code, count))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"
══════════════════════════════════════════════════════
               BACKTEST RESULTS
══════════════════════════════════════════════════════

PERFORMANCE
───────────────────────────────────────────────────────
Net P&L:          {:+.2} ({:+.2}%)
Gross P&L:        {:+.2}
Fees Paid:        {:.2}
Final Equity:     {:.2}
Sharpe Ratio:     {:.2}
Max Drawdown:     {:.2} ({:.2}%)
Win Rate:         {:.1}%
Profit Factor:    {}
Avg Win / Loss:   {:+.2} / {:+.2}
Largest W / L:    {:+.2} / {:+.2}

ACTIVITY
───────────────────────────────────────────────────────
Samples:          {}
Total Trades:     {} ({} won, {} lost)
Max Loss Streak:  {}
Avg Holding:      {}s
Entries:          {} accepted, {} rejected
Anomalies:        {}

REJECTIONS
───────────────────────────────────────────────────────
{}
══════════════════════════════════════════════════════
"#,
            self.net_pnl,
            self.return_pct * dec!(100),
            self.total_pnl,
            self.fees_paid,
            self.final_equity,
            self.sharpe_ratio,
            self.max_drawdown,
            self.max_drawdown_pct * dec!(100),
            self.win_rate * dec!(100),
            profit_factor,
            self.avg_win,
            self.avg_loss,
            self.largest_win,
            self.largest_loss,
            self.samples_processed,
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.max_consecutive_losses,
            self.avg_holding_secs,
            self.signals_accepted,
            self.signals_rejected,
            self.anomalies,
            rejections,
        )
    }
}

/// Per-trade Sharpe, zero with fewer than two trades or no dispersion
fn sharpe(trades: &[ClosedPosition]) -> Decimal {
    if trades.len() < 2 {
        return Decimal::ZERO;
    }
    let returns: Vec<Decimal> = trades.iter().map(ClosedPosition::return_pct).collect();
    let n = Decimal::from(returns.len());
    let mean = returns.iter().sum::<Decimal>() / n;
    let variance = returns
        .iter()
        .map(|r| (*r - mean) * (*r - mean))
        .sum::<Decimal>()
        / (n - Decimal::ONE);

    match variance.sqrt() {
        Some(std) if !std.is_zero() => (mean / std).round_dp(4),
        _ => Decimal::ZERO,
    }
}
