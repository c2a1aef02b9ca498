//! Price ticks and logical time

use crate::ids::InstrumentId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical timestamp used to order ticks for one instrument.
///
/// Ticks are applied only when strictly newer than the last applied one, so
/// `ORIGIN` sits below every stamp the stream client hands out. Prices seeded
/// from a snapshot carry `ORIGIN` and lose to the first live tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalTimestamp(pub u64);

impl LogicalTimestamp {
    pub const ORIGIN: LogicalTimestamp = LogicalTimestamp(0);

    pub fn next(self) -> Self {
        LogicalTimestamp(self.0.saturating_add(1))
    }
}

impl fmt::Display for LogicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// One price/day-change observation for a single instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub instrument_id: InstrumentId,
    pub price: Decimal,
    /// Supplied by the feed, never recomputed
    pub day_change_percent: Decimal,
    pub observed_at: LogicalTimestamp,
}

impl PriceTick {
    pub fn new(
        instrument_id: InstrumentId,
        price: Decimal,
        day_change_percent: Decimal,
        observed_at: LogicalTimestamp,
    ) -> Self {
        Self { instrument_id, price, day_change_percent, observed_at }
    }

    /// True when this tick should replace `current` under the strictly-newer rule
    pub fn supersedes(&self, current: &PriceTick) -> bool {
        self.observed_at > current.observed_at
    }
}
