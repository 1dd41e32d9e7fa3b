//! Risk management module
//!
//! Pre-trade gating, active P&L monitoring and post-trade anomaly
//! detection. The manager is the only writer of [`RiskState`].

mod manager;
mod settlement;
mod slippage;
mod types;

pub use manager::{PreTradeContext, RiskManager};
pub use settlement::{PendingSettlement, SettlementTracker};
pub use slippage::{adverse_slippage, SlippageStats};
pub use types::{RejectReason, RiskLevel, RiskState, SuspensionFlag, SuspensionReason};
