//! Wire types for the order submission endpoints

use portfolio_types::{OrderIntent, OrderMode, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/portfolio/buy` and `POST /api/portfolio/sell`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRequest {
    pub stock_id: u32,
    pub quantity: u32,
    /// Advisory price; the backend decides the fill price
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Body of `POST /api/portfolio/trigger`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerRequest {
    pub stock_id: u32,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub target_price: Decimal,
    /// `B` or `S`
    pub order_type: &'static str,
}

/// A validated order, ready to send
#[derive(Debug, Clone, PartialEq)]
pub enum OrderRequest {
    Instant { side: Side, body: TradeRequest },
    Conditional(TriggerRequest),
}

impl OrderRequest {
    /// Build the request for an intent. `price` is the last observed price for
    /// instant orders and is ignored for conditional ones.
    pub fn from_intent(intent: &OrderIntent, price: Decimal) -> Self {
        match intent.mode {
            OrderMode::Instant => OrderRequest::Instant {
                side: intent.side,
                body: TradeRequest {
                    stock_id: intent.instrument_id.0,
                    quantity: intent.quantity,
                    price,
                },
            },
            OrderMode::Conditional { limit_price } => OrderRequest::Conditional(TriggerRequest {
                stock_id: intent.instrument_id.0,
                quantity: intent.quantity,
                price: limit_price,
                target_price: limit_price,
                order_type: intent.side.code(),
            }),
        }
    }

    /// Endpoint path relative to the backend base URL
    pub fn path(&self) -> &'static str {
        match self {
            OrderRequest::Instant { side: Side::Buy, .. } => "/api/portfolio/buy",
            OrderRequest::Instant { side: Side::Sell, .. } => "/api/portfolio/sell",
            OrderRequest::Conditional(_) => "/api/portfolio/trigger",
        }
    }

    pub fn body(&self) -> serde_json::Result<Value> {
        match self {
            OrderRequest::Instant { body, .. } => serde_json::to_value(body),
            OrderRequest::Conditional(body) => serde_json::to_value(body),
        }
    }
}

/// Backend acknowledgement of a submission. Not an execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub message: Option<String>,
    /// Identifier of an armed conditional order
    #[serde(default, deserialize_with = "string_or_number")]
    pub trigger_id: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_types::{InstrumentId, TicketId};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_instant_request_body() {
        let intent = OrderIntent::instant(TicketId::new(), InstrumentId(12), Side::Sell, 3);
        let request = OrderRequest::from_intent(&intent, dec!(1520.25));

        assert_eq!(request.path(), "/api/portfolio/sell");
        assert_eq!(
            request.body().unwrap(),
            json!({"stock_id": 12, "quantity": 3, "price": 1520.25})
        );
    }

    #[test]
    fn test_conditional_request_body() {
        let intent =
            OrderIntent::conditional(TicketId::new(), InstrumentId(4), Side::Buy, 10, dec!(99.5));
        let request = OrderRequest::from_intent(&intent, dec!(0));

        assert_eq!(request.path(), "/api/portfolio/trigger");
        assert_eq!(
            request.body().unwrap(),
            json!({"stock_id": 4, "quantity": 10, "price": 99.5, "target_price": 99.5, "order_type": "B"})
        );
    }

    #[test]
    fn test_acknowledgement_trigger_id() {
        let ack: Acknowledgement =
            serde_json::from_str(r#"{"status":"success","message":"armed","trigger_id":17}"#).unwrap();
        assert_eq!(ack.trigger_id.as_deref(), Some("17"));
        assert_eq!(ack.message.as_deref(), Some("armed"));
    }
}
