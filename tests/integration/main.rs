//! Integration tests for spikebot

mod config_test;
mod live_test;
mod parity_test;
mod property_test;
mod replay_test;
mod scenario_test;

use chrono::{DateTime, Duration, TimeZone, Utc};

pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 14, 0, 0).unwrap() + Duration::seconds(secs)
}
