//! Position module
//!
//! Open and closed positions, exit conditions and P&L

mod manager;
mod types;

pub use manager::PositionManager;
pub use types::{
    event_group, ClosedPosition, CloseReason, ExecutionAnomaly, Position, PositionError,
    PositionId, PositionStatus,
};
