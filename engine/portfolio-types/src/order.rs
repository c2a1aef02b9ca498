//! Order intents and their identity

use crate::ids::InstrumentId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Single-letter code used by the backend (`B`/`S`)
    pub fn code(self) -> &'static str {
        match self {
            Side::Buy => "B",
            Side::Sell => "S",
        }
    }

    /// Parse the spellings the backend has been seen to use
    pub fn parse(raw: &str) -> Option<Side> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "B" | "BUY" => Some(Side::Buy),
            "S" | "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Identifies one order ticket (the modal session an intent is drafted in)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution mode of an intent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderMode {
    /// Executed immediately at submission
    Instant,
    /// Armed on the backend, executed when the trigger price is reached
    Conditional { limit_price: Decimal },
}

impl OrderMode {
    pub fn is_conditional(&self) -> bool {
        matches!(self, OrderMode::Conditional { .. })
    }
}

/// A trade intent created by user action. Consumed by the order gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub ticket: TicketId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub mode: OrderMode,
    pub quantity: u32,
}

impl OrderIntent {
    pub fn instant(ticket: TicketId, instrument_id: InstrumentId, side: Side, quantity: u32) -> Self {
        Self { ticket, instrument_id, side, mode: OrderMode::Instant, quantity }
    }

    pub fn conditional(
        ticket: TicketId,
        instrument_id: InstrumentId,
        side: Side,
        quantity: u32,
        limit_price: Decimal,
    ) -> Self {
        Self { ticket, instrument_id, side, mode: OrderMode::Conditional { limit_price }, quantity }
    }

    pub fn key(&self) -> IntentKey {
        IntentKey { instrument_id: self.instrument_id, side: self.side, ticket: self.ticket }
    }
}

/// In-flight identity of an intent: instrument, side and ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentKey {
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub ticket: TicketId,
}

impl fmt::Display for IntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (ticket {})", self.side, self.instrument_id, self.ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_parse() {
        assert_eq!(Side::parse("B"), Some(Side::Buy));
        assert_eq!(Side::parse("buy"), Some(Side::Buy));
        assert_eq!(Side::parse("SELL"), Some(Side::Sell));
        assert_eq!(Side::parse("s"), Some(Side::Sell));
        assert_eq!(Side::parse("hold"), None);
    }

    #[test]
    fn test_key_ignores_quantity_and_mode() {
        let ticket = TicketId::new();
        let a = OrderIntent::instant(ticket, InstrumentId(4), Side::Sell, 1);
        let b = OrderIntent::conditional(ticket, InstrumentId(4), Side::Sell, 9, rust_decimal::Decimal::TEN);
        assert_eq!(a.key(), b.key());

        let other_ticket = OrderIntent::instant(TicketId::new(), InstrumentId(4), Side::Sell, 1);
        assert_ne!(a.key(), other_ticket.key());
    }
}
